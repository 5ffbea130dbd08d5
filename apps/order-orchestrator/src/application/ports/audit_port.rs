//! Audit Port (Driven Port)

use async_trait::async_trait;

use crate::domain::audit::NewAuditEntry;

/// Port for audit records written outside an order transition.
///
/// Order transitions carry their audit record through
/// [`OrderRepository`](crate::domain::order_execution::OrderRepository) instead,
/// so both commit together. Write failures are logged loudly by the
/// implementation and never returned to the caller.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an audit record.
    async fn record(&self, entry: NewAuditEntry);
}
