//! Copy Trading Bounded Context
//!
//! Followers subscribe to a leader; a leader's filled live order is re-issued as
//! an independent order for each active follower, scaled by the follower's
//! multiplier and bounded by their maximum trade size.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::RepositoryError;
use crate::domain::shared::UserId;

/// A follower's subscription to a leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySubscription {
    /// User whose trades are copied.
    pub leader_id: UserId,
    /// User receiving the copies.
    pub follower_id: UserId,
    /// Inactive subscriptions are ignored.
    pub is_active: bool,
    /// Scale applied to the leader's quantity.
    pub trade_size_multiplier: Decimal,
    /// Maximum notional of one copied trade.
    pub max_trade_size_usd: Decimal,
}

/// Outcome of sizing a copy for one follower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyDecision {
    /// Place an order of this quantity.
    Copy {
        /// Scaled quantity.
        quantity: Decimal,
    },
    /// Do not copy.
    Skip {
        /// Why the copy was skipped.
        reason: String,
    },
}

impl CopySubscription {
    /// Size the copy of a leader fill for this follower.
    #[must_use]
    pub fn size_copy(&self, leader_quantity: Decimal, reference_price: Decimal) -> CopyDecision {
        let quantity = leader_quantity * self.trade_size_multiplier;
        if quantity <= Decimal::ZERO {
            return CopyDecision::Skip {
                reason: format!("Scaled quantity {quantity} is not positive"),
            };
        }
        let notional = quantity * reference_price;
        if notional > self.max_trade_size_usd {
            return CopyDecision::Skip {
                reason: format!(
                    "Trade value ${} exceeds follower max trade size ${}",
                    notional.round_dp(2),
                    self.max_trade_size_usd
                ),
            };
        }
        CopyDecision::Copy { quantity }
    }
}

/// Repository trait for copy-trade subscriptions.
#[async_trait]
pub trait CopySubscriptionRepository: Send + Sync {
    /// Active subscriptions following `leader_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_active_by_leader(
        &self,
        leader_id: &UserId,
    ) -> Result<Vec<CopySubscription>, RepositoryError>;

    /// Insert or replace a subscription.
    ///
    /// # Errors
    ///
    /// Returns error if persistence fails.
    async fn upsert(&self, subscription: &CopySubscription) -> Result<(), RepositoryError>;
}
