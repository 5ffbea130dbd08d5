//! Audit Bounded Context
//!
//! Append-only compliance trail. Entries are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;

use crate::domain::order_execution::{Order, StatusChange};
use crate::domain::shared::UserId;

/// Kind of audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// An order was created (`PENDING_SUBMIT`).
    OrderCreateRequest,
    /// An order changed status.
    OrderStateChange,
    /// A pre-trade risk check failed.
    RiskRuleViolation,
    /// A risk profile was created or updated.
    RiskProfileUpdate,
    /// The kill switch was engaged.
    TradingHalted,
    /// The kill switch was released.
    TradingResumed,
    /// A reconciliation run completed.
    ReconciliationRun,
    /// A copy trade was skipped for a follower.
    CopyTradeSkipped,
}

impl AuditAction {
    const ALL: [Self; 8] = [
        Self::OrderCreateRequest,
        Self::OrderStateChange,
        Self::RiskRuleViolation,
        Self::RiskProfileUpdate,
        Self::TradingHalted,
        Self::TradingResumed,
        Self::ReconciliationRun,
        Self::CopyTradeSkipped,
    ];

    /// Stable persisted representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreateRequest => "ORDER_CREATE_REQUEST",
            Self::OrderStateChange => "ORDER_STATE_CHANGE",
            Self::RiskRuleViolation => "RISK_RULE_VIOLATION",
            Self::RiskProfileUpdate => "RISK_PROFILE_UPDATE",
            Self::TradingHalted => "TRADING_HALTED",
            Self::TradingResumed => "TRADING_RESUMED",
            Self::ReconciliationRun => "RECONCILIATION_RUN",
            Self::CopyTradeSkipped => "COPY_TRADE_SKIPPED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown audit action: {s}"))
    }
}

/// An audit record not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    /// Acting user, or `None` for the system.
    pub user_id: Option<UserId>,
    /// Kind of action.
    pub action: AuditAction,
    /// Human-readable detail.
    pub details: String,
    /// Structured context.
    pub metadata: Map<String, Value>,
}

impl NewAuditEntry {
    /// Create an audit record.
    #[must_use]
    pub fn new(user_id: Option<UserId>, action: AuditAction, details: impl Into<String>) -> Self {
        Self {
            user_id,
            action,
            details: details.into(),
            metadata: Map::new(),
        }
    }

    /// Attach a metadata value.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Audit record for a freshly created order.
    #[must_use]
    pub fn order_created(order: &Order) -> Self {
        Self::new(
            Some(order.user_id().clone()),
            AuditAction::OrderCreateRequest,
            format!(
                "Order {} created: {} {} {} on {}",
                order.id(),
                order.side(),
                order.quantity_requested(),
                order.symbol(),
                order.venue()
            ),
        )
        .with("order_id", order.id().as_str())
        .with("parent_order_id", order.parent_order_id().map(|p| p.as_str().to_string()))
        .with("is_paper_trade", order.is_paper_trade())
        .with("is_algorithmic", order.is_algorithmic())
    }

    /// Audit record for an order status change.
    #[must_use]
    pub fn state_change(order: &Order, change: StatusChange) -> Self {
        let mut entry = Self::new(
            Some(order.user_id().clone()),
            AuditAction::OrderStateChange,
            format!("Order {} moved {} -> {}", order.id(), change.from, change.to),
        )
        .with("order_id", order.id().as_str())
        .with("from", change.from.as_str())
        .with("to", change.to.as_str())
        .with("quantity_filled", order.quantity_filled().to_string());
        if let Some(id) = order.exchange_order_id() {
            entry = entry.with("exchange_order_id", id);
        }
        if let Some(reason) = order.failure_reason() {
            entry = entry.with("failure_reason", reason);
        }
        entry
    }

    /// Metadata as a JSON object value.
    #[must_use]
    pub fn metadata_value(&self) -> Value {
        Value::Object(self.metadata.clone())
    }
}

/// A persisted audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Storage-assigned identifier.
    pub id: i64,
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
    /// Acting user, or `None` for the system.
    pub user_id: Option<UserId>,
    /// Kind of action.
    pub action: AuditAction,
    /// Human-readable detail.
    pub details: String,
    /// Structured context.
    pub metadata: Map<String, Value>,
}

impl AuditEntry {
    /// Build the persisted form of a new entry.
    #[must_use]
    pub fn from_new(id: i64, timestamp: DateTime<Utc>, entry: NewAuditEntry) -> Self {
        Self {
            id,
            timestamp,
            user_id: entry.user_id,
            action: entry.action,
            details: entry.details,
            metadata: entry.metadata,
        }
    }

    /// Order id referenced by this entry, if any.
    #[must_use]
    pub fn order_id(&self) -> Option<&str> {
        self.metadata.get("order_id").and_then(Value::as_str)
    }
}

/// Serialize any value into audit metadata, falling back to `null`.
pub fn to_metadata_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| json!(null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parse_roundtrip() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>(), Ok(action));
        }
    }

    #[test]
    fn builder_collects_metadata() {
        let entry = NewAuditEntry::new(None, AuditAction::TradingHalted, "halted")
            .with("reason", "drawdown")
            .with("by_admin", true);
        assert_eq!(entry.metadata["reason"], "drawdown");
        assert_eq!(entry.metadata["by_admin"], true);
        assert!(entry.user_id.is_none());
    }
}
