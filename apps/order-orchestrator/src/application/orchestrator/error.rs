//! Orchestrator errors.

use thiserror::Error;

use crate::application::ports::{AdapterError, QueueError};
use crate::application::services::{MarketError, RiskError, RoutingError};
use crate::domain::order_execution::{OrderError, RepositoryError};

/// Top-level error of the orchestrator's entry points.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The intent is structurally invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The account may not trade.
    #[error("Permission denied: {0}")]
    Permission(String),

    /// A risk limit would be breached.
    #[error("Risk limit exceeded: {0}")]
    RiskLimit(String),

    /// A venue or market data source is unavailable.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The order does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store failure.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Unexpected failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Whether this is a lost compare-and-set on an order row.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::Conflict { .. }))
    }
}

impl From<RiskError> for OrchestratorError {
    fn from(err: RiskError) -> Self {
        match err {
            RiskError::PermissionDenied(v) => Self::Permission(v.message),
            RiskError::LimitExceeded(v) => Self::RiskLimit(v.message),
            RiskError::Connectivity(msg) => Self::Connectivity(msg),
            RiskError::Profile(e) => Self::Repository(e),
        }
    }
}

impl From<OrderError> for OrchestratorError {
    fn from(err: OrderError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<MarketError> for OrchestratorError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::SymbolNotFound(_) | MarketError::Adapter(AdapterError::Validation(_)) => {
                Self::Validation(err.to_string())
            }
            MarketError::Adapter(AdapterError::Rejected(msg)) => Self::Validation(msg),
            MarketError::Adapter(AdapterError::NotFound(msg)) => Self::NotFound(msg),
            MarketError::VenueUnavailable { .. } | MarketError::Adapter(_) => {
                Self::Connectivity(err.to_string())
            }
        }
    }
}

impl From<RoutingError> for OrchestratorError {
    fn from(err: RoutingError) -> Self {
        Self::Connectivity(err.to_string())
    }
}

impl From<QueueError> for OrchestratorError {
    fn from(err: QueueError) -> Self {
        Self::Internal(err.to_string())
    }
}
