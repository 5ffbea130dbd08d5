//! Risk management value objects.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::UserId;

/// Per-user risk limits.
///
/// A `None` (or zero USD) limit is inactive. `max_open_positions` of zero is an
/// active limit that blocks every new position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Owner of the profile.
    pub user_id: UserId,
    /// Kill switch: no new orders while set.
    #[serde(default)]
    pub trading_halted: bool,
    /// Maximum concurrent open positions.
    #[serde(default)]
    pub max_open_positions: Option<u32>,
    /// Maximum notional for a single order.
    #[serde(default)]
    pub max_order_value_usd: Option<Decimal>,
    /// Maximum notional per symbol across open positions.
    #[serde(default)]
    pub max_exposure_per_symbol_usd: Option<Decimal>,
    /// Maximum notional across all open positions.
    #[serde(default)]
    pub max_total_exposure_usd: Option<Decimal>,
    /// Daily drawdown limit in percent (stored, not enforced pre-trade).
    #[serde(default)]
    pub max_daily_drawdown_pct: Option<Decimal>,
    /// Total drawdown limit in percent (stored, not enforced pre-trade).
    #[serde(default)]
    pub max_total_drawdown_pct: Option<Decimal>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl RiskProfile {
    /// Profile with no active limits.
    #[must_use]
    pub fn unrestricted(user_id: UserId) -> Self {
        Self {
            user_id,
            trading_halted: false,
            max_open_positions: None,
            max_order_value_usd: None,
            max_exposure_per_symbol_usd: None,
            max_total_exposure_usd: None,
            max_daily_drawdown_pct: None,
            max_total_drawdown_pct: None,
            updated_at: Utc::now(),
        }
    }
}

/// One open position reduced to what the exposure checks need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenExposure {
    /// Instrument symbol.
    pub symbol: String,
    /// Position size.
    pub volume: Decimal,
    /// Current mark price.
    pub price_current: Decimal,
}

impl OpenExposure {
    /// Notional value of the position.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.volume.abs() * self.price_current
    }
}
