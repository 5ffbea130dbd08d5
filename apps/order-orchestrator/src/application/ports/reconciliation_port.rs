//! Reconciliation Report Port (Driven Port)

use async_trait::async_trait;

use crate::domain::order_execution::RepositoryError;
use crate::domain::reconciliation::ReconciliationReport;

/// Storage for reconciliation run results.
#[async_trait]
pub trait ReconciliationReportRepository: Send + Sync {
    /// Persist a finished report.
    async fn save(&self, report: &ReconciliationReport) -> Result<(), RepositoryError>;
}
