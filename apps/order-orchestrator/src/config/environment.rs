//! Deployment mode.
//!
//! The mode labels the deployment in logs and metrics. Whether an individual
//! order is simulated is decided by its own paper flag.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingMode {
    /// Simulated deployment.
    #[default]
    #[serde(alias = "paper")]
    Paper,
    /// Connected to real venue accounts.
    #[serde(alias = "live")]
    Live,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paper => f.write_str("PAPER"),
            Self::Live => f.write_str("LIVE"),
        }
    }
}

/// `environment` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// `PAPER` or `LIVE`.
    #[serde(default)]
    pub mode: TradingMode,
}

impl EnvironmentConfig {
    /// Whether this deployment trades real accounts.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.mode == TradingMode::Live
    }
}
