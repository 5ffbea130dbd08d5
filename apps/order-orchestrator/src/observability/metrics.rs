//! Prometheus metrics for the order orchestrator.
//!
//! Metric names:
//!
//! - `order.latency.ms` histogram, by venue
//! - `trade.fill.count` / `trade.fill.volume` / `trade.fill.notional` counters,
//!   by venue, symbol and side
//! - `audit.write.failures` counter
//! - `reconciliation.runs` counter, by venue and status
//! - `venues.active` gauge

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::application::ports::TelemetrySink;
use crate::domain::order_execution::OrderSide;
use crate::domain::shared::VenueName;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for order latency (milliseconds).
    pub latency_buckets: Vec<f64>,
}

impl MetricsConfig {
    /// Listen on all interfaces at `port`.
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            latency_buckets: vec![
                5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10_000.0,
                30_000.0,
            ],
        }
    }
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Initialize the Prometheus exporter, serving `/metrics`.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %config.listen_addr, "Prometheus metrics exporter started");

    Ok(())
}

// ============================================================================
// Telemetry sink
// ============================================================================

/// [`TelemetrySink`] backed by the global `metrics` recorder.
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsTelemetry;

impl TelemetrySink for MetricsTelemetry {
    fn record_order_latency(&self, venue: &VenueName, latency_ms: f64) {
        histogram!("order.latency.ms", "venue" => venue.to_string()).record(latency_ms);
    }

    fn record_fill(
        &self,
        venue: &VenueName,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) {
        let labels = [
            ("venue", venue.to_string()),
            ("symbol", symbol.to_string()),
            ("side", side.to_string()),
        ];

        counter!("trade.fill.count", &labels).increment(1);
        counter!("trade.fill.volume", &labels).increment(whole_units(quantity));
        counter!("trade.fill.notional", &labels).increment(whole_units(quantity * price));
    }

    fn record_reconciliation(&self, venue: &VenueName, status: &str) {
        record_reconciliation_run(venue.as_str(), status);
    }
}

/// Counters are integral; fractional volume is rounded to the nearest unit.
fn whole_units(value: Decimal) -> u64 {
    value.round().abs().to_u64().unwrap_or(u64::MAX)
}

// ============================================================================
// Operational metrics
// ============================================================================

/// An audit entry could not be written.
pub fn record_audit_write_failure() {
    counter!("audit.write.failures").increment(1);
}

/// A reconciliation run finished.
pub fn record_reconciliation_run(venue: &str, status: &str) {
    counter!(
        "reconciliation.runs",
        "venue" => venue.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Number of connected venues.
pub fn update_active_venues(count: usize) {
    gauge!("venues.active").set(count as f64);
}
