//! Orchestrator, copy trading and reconciliation configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::orchestrator::OrchestratorSettings;
use crate::resilience::RetryConfig;

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound for `place_order`; a timeout is a hard `ERROR`.
    #[serde(default = "default_place_order_timeout")]
    pub place_order_timeout_secs: u64,
    /// Paper path delay before acceptance.
    #[serde(default = "default_paper_submit_delay")]
    pub paper_submit_delay_ms: u64,
    /// Paper path delay before the fill.
    #[serde(default = "default_paper_fill_delay")]
    pub paper_fill_delay_ms: u64,
    /// Attempts for execution reports that arrive before acceptance.
    #[serde(default = "default_report_retry_attempts")]
    pub report_retry_attempts: u32,
    /// Delay between those attempts.
    #[serde(default = "default_report_retry_delay")]
    pub report_retry_delay_ms: u64,
    /// Grace period for in-flight orders at shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// Status polling interval for working orders at venues that push no
    /// execution reports.
    #[serde(default = "default_order_poll_interval")]
    pub order_poll_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            place_order_timeout_secs: default_place_order_timeout(),
            paper_submit_delay_ms: default_paper_submit_delay(),
            paper_fill_delay_ms: default_paper_fill_delay(),
            report_retry_attempts: default_report_retry_attempts(),
            report_retry_delay_ms: default_report_retry_delay(),
            shutdown_grace_secs: default_shutdown_grace(),
            order_poll_interval_ms: default_order_poll_interval(),
        }
    }
}

impl OrchestratorConfig {
    /// Runtime settings for the orchestrator.
    #[must_use]
    pub fn settings(&self, queue_error_backoff: Duration) -> OrchestratorSettings {
        OrchestratorSettings {
            place_order_timeout: Duration::from_secs(self.place_order_timeout_secs),
            paper_submit_delay: Duration::from_millis(self.paper_submit_delay_ms),
            paper_fill_delay: Duration::from_millis(self.paper_fill_delay_ms),
            report_retry: RetryConfig::fixed(
                self.report_retry_attempts,
                Duration::from_millis(self.report_retry_delay_ms),
            ),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            queue_error_backoff,
        }
    }

    /// Status polling interval for working orders.
    #[must_use]
    pub const fn order_poll_interval(&self) -> Duration {
        Duration::from_millis(self.order_poll_interval_ms)
    }
}

const fn default_place_order_timeout() -> u64 {
    30
}

const fn default_paper_submit_delay() -> u64 {
    200
}

const fn default_paper_fill_delay() -> u64 {
    500
}

const fn default_report_retry_attempts() -> u32 {
    5
}

const fn default_report_retry_delay() -> u64 {
    200
}

const fn default_shutdown_grace() -> u64 {
    10
}

const fn default_order_poll_interval() -> u64 {
    2000
}

/// Copy trading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyTradingConfig {
    /// Fan out filled live orders to followers.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Orders with this many copy hops are not copied again.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

impl Default for CopyTradingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: default_max_depth(),
        }
    }
}

const fn default_max_depth() -> u32 {
    1
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Run the periodic loop.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval between runs.
    #[serde(default = "default_reconciliation_interval")]
    pub interval_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconciliation_interval(),
        }
    }
}

impl ReconciliationConfig {
    /// Interval between runs.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

const fn default_reconciliation_interval() -> u64 {
    3600
}

const fn default_true() -> bool {
    true
}
