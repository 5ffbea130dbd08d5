//! Risk management errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The pre-trade check that failed, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCheck {
    /// Account kill switch.
    KillSwitch,
    /// Live quote or positions unavailable.
    MarketData,
    /// Single order notional limit.
    MaxOrderValue,
    /// Concurrent position count limit.
    MaxOpenPositions,
    /// Per-symbol exposure limit.
    SymbolExposure,
    /// Account-wide exposure limit.
    TotalExposure,
}

impl RiskCheck {
    /// Stable name used in audit metadata.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::KillSwitch => "kill_switch",
            Self::MarketData => "market_data",
            Self::MaxOrderValue => "max_order_value",
            Self::MaxOpenPositions => "max_open_positions",
            Self::SymbolExposure => "symbol_exposure",
            Self::TotalExposure => "total_exposure",
        }
    }
}

impl fmt::Display for RiskCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed pre-trade check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskViolation {
    /// Which check failed.
    pub check: RiskCheck,
    /// Human-readable explanation.
    pub message: String,
}

impl RiskViolation {
    /// Create a violation.
    pub fn new(check: RiskCheck, message: impl Into<String>) -> Self {
        Self {
            check,
            message: message.into(),
        }
    }

    /// Kill switch violations are permission errors; the rest are limit breaches.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self.check, RiskCheck::KillSwitch)
    }
}

impl fmt::Display for RiskViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Risk check {} failed: {}", self.check, self.message)
    }
}

impl std::error::Error for RiskViolation {}
