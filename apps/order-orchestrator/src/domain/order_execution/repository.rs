//! Order Repository Trait
//!
//! Defines the persistence abstraction for orders. The store is the only
//! writer of order rows and pairs every write with its audit record in the
//! same transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::aggregate::Order;
use super::value_objects::OrderStatus;
use crate::domain::audit::NewAuditEntry;
use crate::domain::shared::{OrderId, VenueName};

/// Errors from the order store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The row changed underneath a compare-and-set transition.
    #[error("Order {order_id} status conflict: expected {expected}, found {actual}")]
    Conflict {
        /// Order being written.
        order_id: OrderId,
        /// Status the writer expected.
        expected: OrderStatus,
        /// Status found in storage.
        actual: OrderStatus,
    },

    /// Order does not exist.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// Order id already exists.
    #[error("Duplicate order id: {0}")]
    DuplicateOrderId(OrderId),

    /// Exchange order id already belongs to another order.
    #[error("Duplicate exchange order id: {0}")]
    DuplicateExchangeOrderId(String),

    /// Backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored data could not be decoded.
    #[error("Corrupt order row: {0}")]
    Corrupt(String),
}

/// Repository trait for Order persistence.
///
/// This is a domain interface (port) that is implemented by
/// infrastructure adapters (Postgres, in-memory).
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order together with its creation audit record.
    ///
    /// # Errors
    ///
    /// Returns error if the id already exists or persistence fails.
    async fn insert(&self, order: &Order, audit: NewAuditEntry) -> Result<(), RepositoryError>;

    /// Persist a status change if the stored status still equals `expected`,
    /// together with its audit record.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] if another writer moved the order.
    async fn save_transition(
        &self,
        order: &Order,
        expected: OrderStatus,
        audit: NewAuditEntry,
    ) -> Result<(), RepositoryError>;

    /// Find an order by its internal ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Find an order by its venue-assigned id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_by_exchange_order_id(
        &self,
        exchange_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Children of an algorithmic parent, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_children(&self, parent_id: &OrderId) -> Result<Vec<Order>, RepositoryError>;

    /// All orders in a status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError>;

    /// Non-paper orders on a venue that reached `FILLED` within `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_filled_between(
        &self,
        venue: &VenueName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError>;
}
