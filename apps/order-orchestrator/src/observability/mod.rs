//! Observability module for metrics and structured logging.

mod metrics;
mod tracing;

pub use metrics::{
    MetricsConfig, MetricsError, MetricsTelemetry, init_metrics, record_audit_write_failure,
    record_reconciliation_run, update_active_venues,
};
pub use tracing::init_tracing;
