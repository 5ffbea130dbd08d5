//! Alert Port (Driven Port)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of an operational alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Needs immediate action.
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Port for operational alerts.
///
/// Delivery failures are logged by the implementation and never returned.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Send an alert to every configured channel.
    async fn dispatch(&self, message: &str, level: AlertLevel);
}
