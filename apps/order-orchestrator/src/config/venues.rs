//! Venue adapter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::RetryConfig;

/// All venue families.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenuesConfig {
    /// Binance-compatible spot exchange.
    #[serde(default)]
    pub spot: SpotVenueConfig,
    /// CFD broker via MT5 gateway.
    #[serde(default)]
    pub cfd: CfdVenueConfig,
    /// FIX 4.2 counterparty.
    #[serde(default)]
    pub fix: FixVenueConfig,
    /// Connection keeper.
    #[serde(default)]
    pub keeper: KeeperConfig,
}

/// Spot exchange configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotVenueConfig {
    /// Register the adapter.
    #[serde(default)]
    pub enabled: bool,
    /// Venue name.
    #[serde(default = "default_spot_name")]
    pub name: String,
    /// REST base URL.
    #[serde(default = "default_spot_url")]
    pub base_url: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// API secret used for HMAC-SHA256 signatures.
    #[serde(default)]
    pub api_secret: String,
    /// Quote asset excluded from synthesized positions.
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    /// `recvWindow` for signed requests.
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// Symbols always scanned for trade history, in addition to the pairs
    /// implied by non-zero balances.
    #[serde(default)]
    pub history_symbols: Vec<String>,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry policy for reads.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SpotVenueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: default_spot_name(),
            base_url: default_spot_url(),
            api_key: String::new(),
            api_secret: String::new(),
            quote_currency: default_quote_currency(),
            recv_window_ms: default_recv_window(),
            history_symbols: Vec::new(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl SpotVenueConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// CFD broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfdVenueConfig {
    /// Register the adapter.
    #[serde(default)]
    pub enabled: bool,
    /// Venue name.
    #[serde(default = "default_cfd_name")]
    pub name: String,
    /// MT5 gateway base URL.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Trading account login.
    #[serde(default)]
    pub login: String,
    /// Trading account password.
    #[serde(default)]
    pub password: String,
    /// Broker trade server.
    #[serde(default)]
    pub server: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry policy for reads.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for CfdVenueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: default_cfd_name(),
            gateway_url: default_gateway_url(),
            login: String::new(),
            password: String::new(),
            server: String::new(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl CfdVenueConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// FIX counterparty configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixVenueConfig {
    /// Register the adapter.
    #[serde(default)]
    pub enabled: bool,
    /// Venue name.
    #[serde(default = "default_fix_name")]
    pub name: String,
    /// Acceptor host.
    #[serde(default)]
    pub host: String,
    /// Acceptor port.
    #[serde(default = "default_fix_port")]
    pub port: u16,
    /// Our CompID (tag 49).
    #[serde(default)]
    pub sender_comp_id: String,
    /// Counterparty CompID (tag 56).
    #[serde(default)]
    pub target_comp_id: String,
    /// Optional logon username (tag 553).
    #[serde(default)]
    pub username: Option<String>,
    /// Optional logon password (tag 554).
    #[serde(default)]
    pub password: Option<String>,
    /// Heartbeat interval (tag 108).
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    /// TCP connect and logon timeout.
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for FixVenueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: default_fix_name(),
            host: String::new(),
            port: default_fix_port(),
            sender_comp_id: String::new(),
            target_comp_id: String::new(),
            username: None,
            password: None,
            heartbeat_interval_secs: default_heartbeat_secs(),
            connect_timeout_secs: default_timeout_secs(),
        }
    }
}

impl FixVenueConfig {
    /// Heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Connect and logon timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Connection keeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Liveness probe interval.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    /// First reconnect delay.
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_ms: u64,
    /// Maximum reconnect delay.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval(),
            reconnect_initial_ms: default_reconnect_initial(),
            reconnect_max_ms: default_reconnect_max(),
        }
    }
}

impl KeeperConfig {
    /// Probe interval.
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Reconnect backoff policy.
    #[must_use]
    pub const fn retry(&self) -> RetryConfig {
        RetryConfig::unlimited(
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }
}

fn default_spot_name() -> String {
    "spot".to_string()
}

fn default_spot_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_quote_currency() -> String {
    "USDT".to_string()
}

const fn default_recv_window() -> u64 {
    5000
}

const fn default_timeout_secs() -> u64 {
    10
}

fn default_cfd_name() -> String {
    "cfd".to_string()
}

fn default_gateway_url() -> String {
    "http://localhost:8228".to_string()
}

fn default_fix_name() -> String {
    "fix".to_string()
}

const fn default_fix_port() -> u16 {
    9878
}

const fn default_heartbeat_secs() -> u64 {
    30
}

const fn default_probe_interval() -> u64 {
    15
}

const fn default_reconnect_initial() -> u64 {
    1000
}

const fn default_reconnect_max() -> u64 {
    60_000
}
