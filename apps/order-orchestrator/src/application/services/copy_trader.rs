//! Copy Trader
//!
//! Turns a leader's filled live order into follower intents. The orchestrator
//! submits each intent through the full risk gate.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::application::dto::OrderIntent;
use crate::application::ports::AuditSink;
use crate::domain::audit::{AuditAction, NewAuditEntry};
use crate::domain::copy_trading::{CopyDecision, CopySubscriptionRepository};
use crate::domain::order_execution::{COPY_DEPTH_KEY, COPY_OF_ORDER_KEY, Order, OrderStatus};
use crate::domain::shared::UserId;

/// A follower order to create.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowerOrder {
    /// Follower receiving the copy.
    pub follower_id: UserId,
    /// Intent to submit on the follower's behalf.
    pub intent: OrderIntent,
}

/// Copy-trade fan-out planner.
pub struct CopyTrader {
    subscriptions: Arc<dyn CopySubscriptionRepository>,
    audit: Arc<dyn AuditSink>,
    enabled: bool,
    max_depth: u32,
}

impl CopyTrader {
    /// Create a copy trader. Orders at `max_depth` or deeper are not copied.
    pub fn new(
        subscriptions: Arc<dyn CopySubscriptionRepository>,
        audit: Arc<dyn AuditSink>,
        enabled: bool,
        max_depth: u32,
    ) -> Self {
        Self {
            subscriptions,
            audit,
            enabled,
            max_depth,
        }
    }

    /// Whether a finished order qualifies for fan-out.
    #[must_use]
    pub fn should_fan_out(&self, order: &Order) -> bool {
        self.enabled
            && !order.is_paper_trade()
            && order.status() == OrderStatus::Filled
            && order.copy_depth() < self.max_depth
    }

    /// Follower intents for a leader's filled order.
    ///
    /// Skipped followers are logged and audited as `COPY_TRADE_SKIPPED`.
    pub async fn plan_copies(&self, leader_order: &Order) -> Vec<FollowerOrder> {
        if !self.should_fan_out(leader_order) {
            debug!(
                order_id = %leader_order.id(),
                copy_depth = leader_order.copy_depth(),
                "Order does not qualify for copy trading"
            );
            return Vec::new();
        }

        let subscriptions = match self
            .subscriptions
            .find_active_by_leader(leader_order.user_id())
            .await
        {
            Ok(subs) => subs,
            Err(e) => {
                error!(leader_id = %leader_order.user_id(), error = %e, "Failed to load copy subscriptions");
                return Vec::new();
            }
        };

        let Some(reference_price) = leader_order
            .average_fill_price()
            .or_else(|| leader_order.price())
        else {
            error!(order_id = %leader_order.id(), "Filled order has no price to size copies");
            return Vec::new();
        };

        let mut followers = Vec::new();
        for sub in subscriptions.into_iter().filter(|s| s.is_active) {
            match sub.size_copy(leader_order.quantity_filled(), reference_price) {
                CopyDecision::Skip { reason } => {
                    info!(
                        leader_id = %sub.leader_id,
                        follower_id = %sub.follower_id,
                        reason = %reason,
                        "Skipping copy trade"
                    );
                    self.audit
                        .record(
                            NewAuditEntry::new(
                                Some(sub.follower_id.clone()),
                                AuditAction::CopyTradeSkipped,
                                reason,
                            )
                            .with("leader_order_id", leader_order.id().as_str())
                            .with("leader_id", sub.leader_id.as_str()),
                        )
                        .await;
                }
                CopyDecision::Copy { quantity } => {
                    let mut intent = OrderIntent::market(
                        leader_order.venue().as_str(),
                        leader_order.symbol(),
                        leader_order.side(),
                        quantity,
                    );
                    intent.metadata.insert(
                        COPY_OF_ORDER_KEY.to_string(),
                        Value::from(leader_order.id().as_str()),
                    );
                    intent.metadata.insert(
                        COPY_DEPTH_KEY.to_string(),
                        Value::from(leader_order.copy_depth() + 1),
                    );
                    followers.push(FollowerOrder {
                        follower_id: sub.follower_id,
                        intent,
                    });
                }
            }
        }
        followers
    }
}
