//! Application Ports (Driven)
//!
//! Interfaces the application uses to reach external systems. Implemented in
//! the infrastructure layer.

mod alert_port;
mod audit_port;
mod exchange_port;
mod market_types;
mod queue_port;
mod reconciliation_port;
mod telemetry_port;
mod trading_types;

pub use alert_port::{AlertLevel, AlertSink};
pub use audit_port::AuditSink;
pub use exchange_port::{AdapterError, ConnectionStatus, ExchangeAdapter};
pub use market_types::{Kline, SymbolInfo, Tick, Timeframe};
pub use queue_port::{Delivery, QueueError, SubmissionQueue};
pub use reconciliation_port::ReconciliationReportRepository;
pub use telemetry_port::TelemetrySink;
pub use trading_types::{
    AccountBalance, AssetBalance, CancelResult, ExecutionReport, ExecutionReportKind,
    ExecutionReportSender, PlaceOrderRequest, PlaceOrderResult, Position, Trade, VenueOrderPhase,
    VenueOrderState,
};
