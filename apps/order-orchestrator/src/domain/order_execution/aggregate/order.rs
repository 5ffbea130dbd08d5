//! Order Aggregate Root
//!
//! The Order aggregate owns the lifecycle invariants of an orchestrated order:
//! the filled quantity never exceeds the requested quantity, timestamps are set
//! once, the exchange order id never changes once assigned, and status only moves
//! along [`OrderStateMachine`] edges.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::order_execution::errors::OrderError;
use crate::domain::order_execution::services::OrderStateMachine;
use crate::domain::order_execution::value_objects::{OrderSide, OrderStatus, OrderType, TwapParams};
use crate::domain::shared::{OrderId, UserId, VenueName};

/// Metadata key linking a copied order to the leader's order.
pub const COPY_OF_ORDER_KEY: &str = "copy_of_order_id";
/// Metadata key holding the copy-trade fan-out depth.
pub const COPY_DEPTH_KEY: &str = "copy_depth";

/// Command to create a new order.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    /// Owner of the order.
    pub user_id: UserId,
    /// Target venue or `auto`.
    pub venue: VenueName,
    /// Instrument symbol.
    pub symbol: String,
    /// Market or limit.
    pub order_type: OrderType,
    /// Buy or sell.
    pub side: OrderSide,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Simulate instead of executing at a venue.
    pub is_paper_trade: bool,
    /// Decompose into TWAP children.
    pub is_algorithmic: bool,
    /// Parent order for algorithmic children.
    pub parent_order_id: Option<OrderId>,
    /// Free-form metadata (algorithm parameters, strategy linkage).
    pub metadata: Map<String, Value>,
}

impl CreateOrderCommand {
    /// Validate the command.
    ///
    /// # Errors
    ///
    /// Returns error if the quantity is not positive, a limit order has no
    /// positive price, or an algorithmic order lacks valid TWAP parameters.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.symbol.trim().is_empty() {
            return Err(OrderError::invalid("symbol", "Symbol must not be empty"));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(OrderError::invalid("quantity", "Quantity must be positive"));
        }
        if self.order_type.requires_limit_price() {
            match self.price {
                None => {
                    return Err(OrderError::invalid(
                        "price",
                        "Price is required for LIMIT orders",
                    ));
                }
                Some(p) if p <= Decimal::ZERO => {
                    return Err(OrderError::invalid("price", "Price must be positive"));
                }
                Some(_) => {}
            }
        }
        if self.is_algorithmic {
            let valid = TwapParams::from_metadata(&self.metadata).is_some_and(|p| p.is_valid());
            if !valid {
                return Err(OrderError::invalid(
                    "metadata",
                    "Algorithmic orders require positive duration_minutes and num_children, at most one child per millisecond",
                ));
            }
        }
        Ok(())
    }
}

/// Persisted form of an order, used to reconstitute the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Order identifier.
    pub id: OrderId,
    /// Owner.
    pub user_id: UserId,
    /// Venue (or `auto` until routed).
    pub venue: VenueName,
    /// Instrument symbol.
    pub symbol: String,
    /// Market or limit.
    pub order_type: OrderType,
    /// Buy or sell.
    pub side: OrderSide,
    /// Requested quantity.
    pub quantity_requested: Decimal,
    /// Executed quantity.
    pub quantity_filled: Decimal,
    /// Volume-weighted average fill price.
    pub average_fill_price: Option<Decimal>,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Simulated order.
    pub is_paper_trade: bool,
    /// TWAP parent.
    pub is_algorithmic: bool,
    /// Parent for algorithmic children.
    pub parent_order_id: Option<OrderId>,
    /// Venue-assigned id.
    pub exchange_order_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Submission time.
    pub submitted_at: Option<DateTime<Utc>>,
    /// Completion time.
    pub filled_at: Option<DateTime<Utc>>,
    /// Cancellation time.
    pub canceled_at: Option<DateTime<Utc>>,
    /// Reason for a failed terminal state.
    pub failure_reason: Option<String>,
    /// Free-form metadata.
    pub metadata: Map<String, Value>,
}

/// A status change performed by an aggregate method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// Status before the change.
    pub from: OrderStatus,
    /// Status after the change.
    pub to: OrderStatus,
}

/// Order aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "OrderSnapshot", into = "OrderSnapshot")]
pub struct Order {
    state: OrderSnapshot,
}

impl Order {
    /// Create a new order in `PENDING_SUBMIT`.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails validation.
    pub fn new(cmd: CreateOrderCommand, now: DateTime<Utc>) -> Result<Self, OrderError> {
        cmd.validate()?;
        Ok(Self {
            state: OrderSnapshot {
                id: OrderId::generate(),
                user_id: cmd.user_id,
                venue: cmd.venue,
                symbol: cmd.symbol,
                order_type: cmd.order_type,
                side: cmd.side,
                quantity_requested: cmd.quantity,
                quantity_filled: Decimal::ZERO,
                average_fill_price: None,
                price: cmd.price,
                status: OrderStatus::PendingSubmit,
                is_paper_trade: cmd.is_paper_trade,
                is_algorithmic: cmd.is_algorithmic,
                parent_order_id: cmd.parent_order_id,
                exchange_order_id: None,
                created_at: now,
                submitted_at: None,
                filled_at: None,
                canceled_at: None,
                failure_reason: None,
                metadata: cmd.metadata,
            },
        })
    }

    /// Reconstitute an order from storage.
    #[must_use]
    pub const fn reconstitute(snapshot: OrderSnapshot) -> Self {
        Self { state: snapshot }
    }

    /// Persisted view of the order.
    #[must_use]
    pub const fn snapshot(&self) -> &OrderSnapshot {
        &self.state
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Order identifier.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.state.id
    }

    /// Owner.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.state.user_id
    }

    /// Target venue.
    #[must_use]
    pub const fn venue(&self) -> &VenueName {
        &self.state.venue
    }

    /// Instrument symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.state.symbol
    }

    /// Market or limit.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        self.state.order_type
    }

    /// Buy or sell.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.state.side
    }

    /// Requested quantity.
    #[must_use]
    pub const fn quantity_requested(&self) -> Decimal {
        self.state.quantity_requested
    }

    /// Executed quantity.
    #[must_use]
    pub const fn quantity_filled(&self) -> Decimal {
        self.state.quantity_filled
    }

    /// Quantity still open.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.state.quantity_requested - self.state.quantity_filled
    }

    /// Volume-weighted average fill price.
    #[must_use]
    pub const fn average_fill_price(&self) -> Option<Decimal> {
        self.state.average_fill_price
    }

    /// Limit price.
    #[must_use]
    pub const fn price(&self) -> Option<Decimal> {
        self.state.price
    }

    /// Lifecycle status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.state.status
    }

    /// Simulated order.
    #[must_use]
    pub const fn is_paper_trade(&self) -> bool {
        self.state.is_paper_trade
    }

    /// TWAP parent.
    #[must_use]
    pub const fn is_algorithmic(&self) -> bool {
        self.state.is_algorithmic
    }

    /// Parent order for algorithmic children.
    #[must_use]
    pub const fn parent_order_id(&self) -> Option<&OrderId> {
        self.state.parent_order_id.as_ref()
    }

    /// Venue-assigned order id.
    #[must_use]
    pub fn exchange_order_id(&self) -> Option<&str> {
        self.state.exchange_order_id.as_deref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.state.created_at
    }

    /// Submission time.
    #[must_use]
    pub const fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.state.submitted_at
    }

    /// Completion time.
    #[must_use]
    pub const fn filled_at(&self) -> Option<DateTime<Utc>> {
        self.state.filled_at
    }

    /// Cancellation time.
    #[must_use]
    pub const fn canceled_at(&self) -> Option<DateTime<Utc>> {
        self.state.canceled_at
    }

    /// Reason for a failed terminal state.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.state.failure_reason.as_deref()
    }

    /// Free-form metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Map<String, Value> {
        &self.state.metadata
    }

    /// TWAP parameters for algorithmic parents.
    #[must_use]
    pub fn twap_params(&self) -> Option<TwapParams> {
        TwapParams::from_metadata(&self.state.metadata)
    }

    /// How many copy-trade hops produced this order (0 for original orders).
    #[must_use]
    pub fn copy_depth(&self) -> u32 {
        self.state
            .metadata
            .get(COPY_DEPTH_KEY)
            .and_then(Value::as_u64)
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or(0)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Mark the order as sent to the venue.
    ///
    /// # Errors
    ///
    /// Returns error if the order is not `PENDING_SUBMIT`.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<StatusChange, OrderError> {
        let change = self.transition_to(OrderStatus::Submitted)?;
        set_once(&mut self.state.submitted_at, now);
        Ok(change)
    }

    /// Record the venue chosen by smart routing for an `auto` order.
    ///
    /// # Errors
    ///
    /// Returns error if the order was not smart-routed or is no longer `SUBMITTED`.
    pub fn route_to(&mut self, venue: VenueName) -> Result<(), OrderError> {
        if !self.state.venue.is_auto() {
            return Err(OrderError::invalid(
                "venue",
                format!("Order is already bound to venue {}", self.state.venue),
            ));
        }
        if self.state.status != OrderStatus::Submitted {
            return Err(OrderError::invalid(
                "venue",
                format!("Cannot route an order in status {}", self.state.status),
            ));
        }
        self.state.venue = venue;
        Ok(())
    }

    /// Mark the order as working at the venue.
    ///
    /// Algorithmic parents move here directly from `PENDING_SUBMIT` without an
    /// exchange id.
    ///
    /// # Errors
    ///
    /// Returns error on an invalid transition, or if a different exchange id was
    /// already assigned.
    pub fn accept(&mut self, exchange_order_id: Option<String>) -> Result<StatusChange, OrderError> {
        if self.state.status == OrderStatus::PendingSubmit && !self.state.is_algorithmic {
            return Err(OrderError::InvalidStateTransition {
                from: OrderStatus::PendingSubmit,
                to: OrderStatus::Accepted,
                reason: "Only algorithmic parents are accepted without submission".to_string(),
            });
        }
        if let (Some(existing), Some(new)) = (&self.state.exchange_order_id, &exchange_order_id) {
            if existing != new {
                return Err(OrderError::ExchangeOrderIdAlreadySet {
                    existing: existing.clone(),
                });
            }
        }
        let change = self.transition_to(OrderStatus::Accepted)?;
        if self.state.exchange_order_id.is_none() {
            self.state.exchange_order_id = exchange_order_id;
        }
        Ok(change)
    }

    /// Apply an execution.
    ///
    /// Moves to `PARTIALLY_FILLED` or `FILLED` and updates the volume-weighted
    /// average fill price.
    ///
    /// # Errors
    ///
    /// Returns error if the order cannot receive fills, the quantity is not
    /// positive, or the fill exceeds the remaining quantity.
    pub fn apply_fill(
        &mut self,
        quantity: Decimal,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, OrderError> {
        if quantity <= Decimal::ZERO {
            return Err(OrderError::invalid("fill_qty", "Fill quantity must be positive"));
        }
        let remaining = self.remaining_quantity();
        if quantity > remaining {
            return Err(OrderError::FillExceedsRemaining {
                fill_qty: quantity.to_string(),
                remaining_qty: remaining.to_string(),
            });
        }

        let target = if quantity == remaining {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        let change = self.transition_to(target)?;

        let filled = self.state.quantity_filled;
        let new_filled = filled + quantity;
        let prior_notional = self.state.average_fill_price.unwrap_or(Decimal::ZERO) * filled;
        self.state.average_fill_price = Some((prior_notional + price * quantity) / new_filled);
        self.state.quantity_filled = new_filled;

        if target == OrderStatus::Filled {
            set_once(&mut self.state.filled_at, now);
        }
        Ok(change)
    }

    /// Venue declined the order.
    ///
    /// # Errors
    ///
    /// Returns error on an invalid transition.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<StatusChange, OrderError> {
        let change = self.transition_to(OrderStatus::Rejected)?;
        self.state.failure_reason = Some(reason.into());
        Ok(change)
    }

    /// Unexpected failure after persistence.
    ///
    /// # Errors
    ///
    /// Returns error on an invalid transition.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<StatusChange, OrderError> {
        let change = self.transition_to(OrderStatus::Error)?;
        self.state.failure_reason = Some(reason.into());
        Ok(change)
    }

    /// Order canceled.
    ///
    /// # Errors
    ///
    /// Returns error on an invalid transition.
    pub fn cancel(
        &mut self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, OrderError> {
        let change = self.transition_to(OrderStatus::Canceled)?;
        set_once(&mut self.state.canceled_at, now);
        if reason.is_some() {
            self.state.failure_reason = reason;
        }
        Ok(change)
    }

    /// Time-in-force elapsed.
    ///
    /// # Errors
    ///
    /// Returns error on an invalid transition.
    pub fn expire(&mut self, reason: Option<String>) -> Result<StatusChange, OrderError> {
        let change = self.transition_to(OrderStatus::Expired)?;
        if reason.is_some() {
            self.state.failure_reason = reason;
        }
        Ok(change)
    }

    fn transition_to(&mut self, to: OrderStatus) -> Result<StatusChange, OrderError> {
        let from = self.state.status;
        OrderStateMachine::validate_transition(from, to)?;
        self.state.status = to;
        Ok(StatusChange { from, to })
    }
}

impl From<OrderSnapshot> for Order {
    fn from(snapshot: OrderSnapshot) -> Self {
        Self::reconstitute(snapshot)
    }
}

impl From<Order> for OrderSnapshot {
    fn from(order: Order) -> Self {
        order.state
    }
}

fn set_once(slot: &mut Option<DateTime<Utc>>, now: DateTime<Utc>) {
    if slot.is_none() {
        *slot = Some(now);
    }
}
