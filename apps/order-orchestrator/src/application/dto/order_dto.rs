//! Order DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::order_execution::{
    CreateOrderCommand, Order, OrderSide, OrderStatus, OrderType, TwapParams,
};
use crate::domain::shared::{OrderId, UserId, VenueName};

/// A trade intent submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Venue name or `auto`.
    pub venue: VenueName,
    /// Symbol.
    pub symbol: String,
    /// Type.
    pub order_type: OrderType,
    /// Side.
    pub side: OrderSide,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Simulate instead of executing.
    #[serde(default)]
    pub is_paper_trade: bool,
    /// Decompose with TWAP.
    #[serde(default)]
    pub is_algorithmic: bool,
    /// Metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl OrderIntent {
    /// Market order intent.
    #[must_use]
    pub fn market(venue: &str, symbol: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            venue: VenueName::new(venue),
            symbol: symbol.to_string(),
            order_type: OrderType::Market,
            side,
            quantity,
            price: None,
            is_paper_trade: false,
            is_algorithmic: false,
            metadata: Map::new(),
        }
    }

    /// Limit order intent.
    #[must_use]
    pub fn limit(venue: &str, symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(venue, symbol, side, quantity)
        }
    }

    /// Mark as paper trade.
    #[must_use]
    pub const fn paper(mut self) -> Self {
        self.is_paper_trade = true;
        self
    }

    /// Mark as a TWAP parent.
    #[must_use]
    pub fn twap(mut self, duration_minutes: u32, num_children: u32) -> Self {
        self.is_algorithmic = true;
        TwapParams::new(duration_minutes, num_children).write_to(&mut self.metadata);
        self
    }

    /// Domain command for this intent.
    #[must_use]
    pub fn into_command(self, user_id: UserId, parent_order_id: Option<OrderId>) -> CreateOrderCommand {
        CreateOrderCommand {
            user_id,
            venue: self.venue,
            symbol: self.symbol,
            order_type: self.order_type,
            side: self.side,
            quantity: self.quantity,
            price: self.price,
            is_paper_trade: self.is_paper_trade,
            is_algorithmic: self.is_algorithmic,
            parent_order_id,
            metadata: self.metadata,
        }
    }
}

/// DTO representing an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDto {
    /// Order ID.
    pub id: OrderId,
    /// Owner.
    pub user_id: UserId,
    /// Venue.
    pub venue: VenueName,
    /// Symbol.
    pub symbol: String,
    /// Type.
    pub order_type: OrderType,
    /// Side.
    pub side: OrderSide,
    /// Quantity.
    pub quantity_requested: Decimal,
    /// Filled quantity.
    pub quantity_filled: Decimal,
    /// Remaining quantity.
    pub remaining_quantity: Decimal,
    /// Average fill price.
    pub average_fill_price: Option<Decimal>,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Status.
    pub status: OrderStatus,
    /// Paper trade.
    pub is_paper_trade: bool,
    /// Algorithmic parent.
    pub is_algorithmic: bool,
    /// Parent order.
    pub parent_order_id: Option<OrderId>,
    /// Venue order ID.
    pub exchange_order_id: Option<String>,
    /// Failure reason.
    pub failure_reason: Option<String>,
    /// Created at.
    pub created_at: DateTime<Utc>,
    /// Submitted at.
    pub submitted_at: Option<DateTime<Utc>>,
    /// Filled at.
    pub filled_at: Option<DateTime<Utc>>,
    /// Canceled at.
    pub canceled_at: Option<DateTime<Utc>>,
}

impl OrderDto {
    /// Create from domain Order.
    #[must_use]
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id().clone(),
            user_id: order.user_id().clone(),
            venue: order.venue().clone(),
            symbol: order.symbol().to_string(),
            order_type: order.order_type(),
            side: order.side(),
            quantity_requested: order.quantity_requested(),
            quantity_filled: order.quantity_filled(),
            remaining_quantity: order.remaining_quantity(),
            average_fill_price: order.average_fill_price(),
            price: order.price(),
            status: order.status(),
            is_paper_trade: order.is_paper_trade(),
            is_algorithmic: order.is_algorithmic(),
            parent_order_id: order.parent_order_id().cloned(),
            exchange_order_id: order.exchange_order_id().map(str::to_string),
            failure_reason: order.failure_reason().map(str::to_string),
            created_at: order.created_at(),
            submitted_at: order.submitted_at(),
            filled_at: order.filled_at(),
            canceled_at: order.canceled_at(),
        }
    }
}

impl From<&Order> for OrderDto {
    fn from(order: &Order) -> Self {
        Self::from_order(order)
    }
}
