//! Execution types shared by all venues.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::order_execution::{Order, OrderSide, OrderType};
use crate::domain::shared::{OrderId, VenueName};

/// Request to place an order at a venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Internal order id, sent as the venue's client order id.
    pub client_order_id: OrderId,
    /// Venue symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Market or limit.
    pub order_type: OrderType,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Stop loss price.
    pub stop_loss: Option<Decimal>,
    /// Take profit price.
    pub take_profit: Option<Decimal>,
    /// Free-text tag.
    pub comment: String,
}

impl PlaceOrderRequest {
    /// Build the venue request for a persisted order.
    #[must_use]
    pub fn for_order(order: &Order) -> Self {
        let price_meta = |key: &str| {
            order
                .metadata()
                .get(key)
                .and_then(|v| v.as_str().map(str::to_string).or_else(|| Some(v.to_string())))
                .and_then(|s| s.parse::<Decimal>().ok())
        };
        Self {
            client_order_id: order.id().clone(),
            symbol: order.symbol().to_string(),
            side: order.side(),
            order_type: order.order_type(),
            quantity: order.quantity_requested(),
            price: order.price(),
            stop_loss: price_meta("stop_loss"),
            take_profit: price_meta("take_profit"),
            comment: "orchestrator".to_string(),
        }
    }
}

/// Normalized result of `place_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderResult {
    /// Venue accepted the order.
    pub success: bool,
    /// Venue-native return code.
    pub retcode: i64,
    /// Venue order id.
    pub exchange_order_id: Option<String>,
    /// Venue deal/trade id for immediate executions.
    pub deal_id: Option<String>,
    /// Quantity executed synchronously.
    pub filled_quantity: Decimal,
    /// Average price of the synchronous execution.
    pub fill_price: Option<Decimal>,
    /// Venue message (verbatim rejection reason on failure).
    pub message: String,
}

impl PlaceOrderResult {
    /// Whether the venue reported an execution in the response itself.
    #[must_use]
    pub fn has_synchronous_fill(&self) -> bool {
        self.filled_quantity > Decimal::ZERO && self.fill_price.is_some()
    }
}

/// Normalized result of `cancel_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    /// Venue order id.
    pub exchange_order_id: String,
    /// Venue-native status after the cancel.
    pub status: String,
}

/// Lifecycle of an order as the venue reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VenueOrderPhase {
    /// Resting or partially executed.
    Working,
    /// Fully executed.
    Done,
    /// Canceled at the venue.
    Canceled,
    /// Refused after acknowledgment.
    Rejected,
    /// Time in force elapsed.
    Expired,
}

/// Venue view of one order, used to derive execution reports by polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueOrderState {
    /// Venue order id.
    pub exchange_order_id: String,
    /// Venue lifecycle phase.
    pub phase: VenueOrderPhase,
    /// Cumulative executed quantity.
    pub filled_quantity: Decimal,
    /// Average price of the cumulative execution.
    pub average_price: Option<Decimal>,
    /// Venue text for rejections.
    pub reason: Option<String>,
    /// Last venue update.
    pub updated_at: DateTime<Utc>,
}

/// An open position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Venue position id (asset name on spot venues).
    pub ticket: String,
    /// Venue symbol.
    pub symbol: String,
    /// Long or short.
    pub side: OrderSide,
    /// Position size.
    pub volume: Decimal,
    /// Entry price (zero when unknown).
    pub price_open: Decimal,
    /// Current mark price.
    pub price_current: Decimal,
    /// Unrealized profit.
    pub profit: Decimal,
    /// Open time when known.
    pub opened_at: Option<DateTime<Utc>>,
}

/// An execution from the venue's trade history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Venue trade/deal id.
    pub ticket: String,
    /// Venue order id the execution belongs to.
    pub exchange_order_id: String,
    /// Venue symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Executed quantity.
    pub volume: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Realized profit or commission-adjusted result.
    pub profit: Decimal,
    /// Execution time.
    pub time: DateTime<Utc>,
}

/// Balance of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    /// Asset code.
    pub asset: String,
    /// Available amount.
    pub free: Decimal,
    /// Amount locked in orders.
    pub locked: Decimal,
}

/// Account balance summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Account currency.
    pub currency: String,
    /// Cash balance.
    pub balance: Decimal,
    /// Balance plus unrealized profit.
    pub equity: Decimal,
    /// Margin available for new positions.
    pub free_margin: Option<Decimal>,
    /// Per-asset balances (spot venues).
    pub assets: Vec<AssetBalance>,
}

/// Kind of an asynchronous execution report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionReportKind {
    /// Quantity executed.
    Fill {
        /// Executed quantity of this report.
        quantity: Decimal,
        /// Execution price.
        price: Decimal,
    },
    /// Order canceled at the venue.
    Canceled,
    /// Order rejected after acknowledgment.
    Rejected {
        /// Venue text.
        reason: String,
    },
    /// Order expired at the venue.
    Expired,
}

/// Execution report pushed by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Reporting venue.
    pub venue: VenueName,
    /// Venue order id.
    pub exchange_order_id: String,
    /// Client order id echoed by the venue, when available.
    pub client_order_id: Option<OrderId>,
    /// What happened.
    pub kind: ExecutionReportKind,
    /// Venue time of the event.
    pub time: DateTime<Utc>,
}

/// Channel adapters push execution reports into.
pub type ExecutionReportSender = mpsc::UnboundedSender<ExecutionReport>;
