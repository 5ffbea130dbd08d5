//! Telemetry Port (Driven Port)

use rust_decimal::Decimal;

use crate::domain::order_execution::OrderSide;
use crate::domain::shared::VenueName;

/// Fire-and-forget numeric observations. Never blocks, never fails.
pub trait TelemetrySink: Send + Sync {
    /// Time from submission to the venue's response.
    fn record_order_latency(&self, venue: &VenueName, latency_ms: f64);

    /// An execution (count, volume and notional).
    fn record_fill(
        &self,
        venue: &VenueName,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    );

    /// A reconciliation run finished with `status`.
    fn record_reconciliation(&self, venue: &VenueName, status: &str);
}
