//! Submission Queue Port (Driven Port)
//!
//! A durable FIFO of order ids with at-least-once delivery. Consumers must
//! tolerate duplicates.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::shared::OrderId;

/// Submission queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Backend failure.
    #[error("Queue backend error: {0}")]
    Backend(String),

    /// The queue was closed.
    #[error("Queue closed")]
    Closed,
}

/// One delivered queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Backend receipt used to acknowledge the entry.
    pub receipt: i64,
    /// Order to process.
    pub order_id: OrderId,
}

/// Port for the submission queue.
#[async_trait]
pub trait SubmissionQueue: Send + Sync {
    /// Append an order id.
    async fn enqueue(&self, order_id: &OrderId) -> Result<(), QueueError>;

    /// Wait for the next entry. Unacknowledged entries are redelivered.
    async fn dequeue(&self) -> Result<Delivery, QueueError>;

    /// Remove a processed entry.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;
}
