//! Risk Gate
//!
//! Pre-trade validation against a user's [`RiskProfile`]. Checks run in a fixed
//! order and stop at the first failure. Every failure is audited as
//! `RISK_RULE_VIOLATION` before it is returned.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use super::market_facade::MarketFacade;
use super::smart_order_router::SmartOrderRouter;
use crate::application::dto::OrderIntent;
use crate::application::ports::{AuditSink, Tick};
use crate::domain::audit::{AuditAction, NewAuditEntry, to_metadata_value};
use crate::domain::order_execution::RepositoryError;
use crate::domain::risk_management::{
    OpenExposure, PreTradeLimits, RiskCheck, RiskProfile, RiskProfileRepository, RiskViolation,
};
use crate::domain::shared::{UserId, VenueName};

/// Risk gate errors.
#[derive(Debug, Error)]
pub enum RiskError {
    /// Account is halted.
    #[error("{}", .0.message)]
    PermissionDenied(RiskViolation),

    /// A limit would be breached.
    #[error("{}", .0.message)]
    LimitExceeded(RiskViolation),

    /// Market data or positions could not be fetched.
    #[error("Risk check could not complete: {0}")]
    Connectivity(String),

    /// Profile storage failed.
    #[error("Risk profile storage error: {0}")]
    Profile(#[from] RepositoryError),
}

impl From<RiskViolation> for RiskError {
    fn from(violation: RiskViolation) -> Self {
        if violation.is_permission_denied() {
            Self::PermissionDenied(violation)
        } else {
            Self::LimitExceeded(violation)
        }
    }
}

/// Pre-trade risk gate.
pub struct RiskGate {
    profiles: Arc<dyn RiskProfileRepository>,
    market: MarketFacade,
    router: SmartOrderRouter,
    audit: Arc<dyn AuditSink>,
}

impl RiskGate {
    /// Create a risk gate.
    pub fn new(
        profiles: Arc<dyn RiskProfileRepository>,
        market: MarketFacade,
        router: SmartOrderRouter,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            profiles,
            market,
            router,
            audit,
        }
    }

    /// Validate a trade intent for a user.
    ///
    /// Users without a profile pass without any market data call.
    pub async fn validate_pre_trade(
        &self,
        user_id: &UserId,
        intent: &OrderIntent,
    ) -> Result<(), RiskError> {
        let Some(profile) = self.profiles.find_by_user(user_id).await? else {
            return Ok(());
        };

        if let Err(violation) = PreTradeLimits::check_kill_switch(&profile) {
            return Err(self.reject(user_id, intent, &profile, violation).await);
        }

        let (venue, tick) = match self.resolve_market(intent).await {
            Ok(found) => found,
            Err(message) => {
                let violation = RiskViolation::new(RiskCheck::MarketData, message.clone());
                self.record_violation(user_id, intent, &profile, &violation).await;
                return Err(RiskError::Connectivity(message));
            }
        };

        let positions = match self.market.get_open_positions(venue.as_str()).await {
            Ok(positions) => positions,
            Err(e) => {
                let message = format!("Could not fetch open positions on {venue}: {e}");
                let violation = RiskViolation::new(RiskCheck::MarketData, message.clone());
                self.record_violation(user_id, intent, &profile, &violation).await;
                return Err(RiskError::Connectivity(message));
            }
        };
        let exposures: Vec<OpenExposure> = positions
            .into_iter()
            .map(|p| OpenExposure {
                symbol: p.symbol,
                volume: p.volume,
                price_current: p.price_current,
            })
            .collect();

        let price = tick.price_for(intent.side);
        if let Err(violation) = PreTradeLimits::check_limits(
            &profile,
            &intent.symbol,
            intent.quantity,
            price,
            &exposures,
        ) {
            return Err(self.reject(user_id, intent, &profile, violation).await);
        }
        Ok(())
    }

    /// Current profile of a user.
    pub async fn get_profile(&self, user_id: &UserId) -> Result<Option<RiskProfile>, RiskError> {
        Ok(self.profiles.find_by_user(user_id).await?)
    }

    /// Create or replace a profile.
    pub async fn upsert_profile(
        &self,
        actor: Option<&UserId>,
        mut profile: RiskProfile,
    ) -> Result<RiskProfile, RiskError> {
        profile.updated_at = Utc::now();
        self.profiles.upsert(&profile).await?;
        info!(user_id = %profile.user_id, "Risk profile updated");
        self.audit
            .record(
                NewAuditEntry::new(
                    actor.cloned(),
                    AuditAction::RiskProfileUpdate,
                    format!("Risk profile updated for {}", profile.user_id),
                )
                .with("target_user_id", profile.user_id.as_str())
                .with("profile", to_metadata_value(&profile)),
            )
            .await;
        Ok(profile)
    }

    /// Engage the kill switch for a user.
    pub async fn halt_trading(
        &self,
        actor: Option<&UserId>,
        user_id: &UserId,
        reason: &str,
    ) -> Result<RiskProfile, RiskError> {
        self.set_halted(actor, user_id, true, reason).await
    }

    /// Release the kill switch for a user.
    pub async fn resume_trading(
        &self,
        actor: Option<&UserId>,
        user_id: &UserId,
        reason: &str,
    ) -> Result<RiskProfile, RiskError> {
        self.set_halted(actor, user_id, false, reason).await
    }

    async fn set_halted(
        &self,
        actor: Option<&UserId>,
        user_id: &UserId,
        halted: bool,
        reason: &str,
    ) -> Result<RiskProfile, RiskError> {
        let mut profile = self
            .profiles
            .find_by_user(user_id)
            .await?
            .unwrap_or_else(|| RiskProfile::unrestricted(user_id.clone()));
        profile.trading_halted = halted;
        profile.updated_at = Utc::now();
        self.profiles.upsert(&profile).await?;

        let action = if halted {
            warn!(user_id = %user_id, reason, "Trading halted");
            AuditAction::TradingHalted
        } else {
            info!(user_id = %user_id, reason, "Trading resumed");
            AuditAction::TradingResumed
        };
        self.audit
            .record(
                NewAuditEntry::new(actor.cloned(), action, format!("{action} for {user_id}: {reason}"))
                    .with("target_user_id", user_id.as_str())
                    .with("reason", reason),
            )
            .await;
        Ok(profile)
    }

    async fn resolve_market(&self, intent: &OrderIntent) -> Result<(VenueName, Tick), String> {
        if intent.venue.is_auto() {
            return self
                .router
                .get_best_quote(&intent.symbol, intent.side)
                .await
                .map(|best| (best.venue, best.tick))
                .ok_or_else(|| format!("No active venue quotes {}", intent.symbol));
        }
        match self
            .market
            .get_latest_tick(intent.venue.as_str(), &intent.symbol)
            .await
        {
            Ok(Some(tick)) => Ok((intent.venue.clone(), tick)),
            Ok(None) => Err(format!("Could not fetch market price for {}", intent.symbol)),
            Err(e) => Err(format!(
                "Could not fetch market price for {}: {e}",
                intent.symbol
            )),
        }
    }

    async fn reject(
        &self,
        user_id: &UserId,
        intent: &OrderIntent,
        profile: &RiskProfile,
        violation: RiskViolation,
    ) -> RiskError {
        self.record_violation(user_id, intent, profile, &violation).await;
        violation.into()
    }

    async fn record_violation(
        &self,
        user_id: &UserId,
        intent: &OrderIntent,
        profile: &RiskProfile,
        violation: &RiskViolation,
    ) {
        warn!(
            user_id = %user_id,
            symbol = %intent.symbol,
            check = %violation.check,
            "Pre-trade risk check failed"
        );
        self.audit
            .record(
                NewAuditEntry::new(
                    Some(user_id.clone()),
                    AuditAction::RiskRuleViolation,
                    violation.message.clone(),
                )
                .with("order_request", to_metadata_value(intent))
                .with("check_failed", violation.check.as_str())
                .with("profile", to_metadata_value(profile)),
            )
            .await;
    }
}
