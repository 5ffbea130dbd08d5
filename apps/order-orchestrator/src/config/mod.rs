//! Configuration module for the order orchestrator.
//!
//! Loads YAML configuration with `${VAR}` / `${VAR:-default}` environment
//! interpolation and validates it before any component is built.
//!
//! # Usage
//!
//! ```rust,ignore
//! use order_orchestrator::config::load_config;
//!
//! let config = load_config(Some("config.yaml"))?;
//! println!("spot enabled: {}", config.venues.spot.enabled);
//! ```

mod alerting;
mod environment;
mod observability;
mod orchestrator;
mod persistence;
mod venues;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use alerting::{AlertingConfig, SlackConfig, TelegramConfig};
pub use environment::{EnvironmentConfig, TradingMode};
pub use observability::{LogFormat, ObservabilityConfig};
pub use orchestrator::{CopyTradingConfig, OrchestratorConfig, ReconciliationConfig};
pub use persistence::{PersistenceBackend, PersistenceConfig, QueueConfig};
pub use venues::{CfdVenueConfig, FixVenueConfig, KeeperConfig, SpotVenueConfig, VenuesConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Trading mode.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Venue adapters.
    #[serde(default)]
    pub venues: VenuesConfig,
    /// Order store backend.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Submission queue.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Orchestrator timing.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Copy trading fan-out.
    #[serde(default)]
    pub copy_trading: CopyTradingConfig,
    /// Periodic reconciliation.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Alert channels.
    #[serde(default)]
    pub alerting: AlertingConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// `path` defaults to `config.yaml`.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. Unset or empty
/// variables take the default, or the empty string when there is none.
#[allow(clippy::expect_used)] // Regex is a compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match cap.get(1).map(|m| std::env::var(m.as_str())) {
            Some(Ok(v)) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let venues = &config.venues;
    if venues.spot.enabled {
        require("venues.spot.api_key", &venues.spot.api_key)?;
        require("venues.spot.api_secret", &venues.spot.api_secret)?;
        require("venues.spot.base_url", &venues.spot.base_url)?;
    }
    if venues.cfd.enabled {
        require("venues.cfd.gateway_url", &venues.cfd.gateway_url)?;
        require("venues.cfd.login", &venues.cfd.login)?;
        require("venues.cfd.password", &venues.cfd.password)?;
        require("venues.cfd.server", &venues.cfd.server)?;
    }
    if venues.fix.enabled {
        require("venues.fix.host", &venues.fix.host)?;
        require("venues.fix.sender_comp_id", &venues.fix.sender_comp_id)?;
        require("venues.fix.target_comp_id", &venues.fix.target_comp_id)?;
        positive("venues.fix.heartbeat_interval_secs", venues.fix.heartbeat_interval_secs)?;
    }

    let enabled_names: Vec<&str> = [
        (venues.spot.enabled, venues.spot.name.as_str()),
        (venues.cfd.enabled, venues.cfd.name.as_str()),
        (venues.fix.enabled, venues.fix.name.as_str()),
    ]
    .into_iter()
    .filter_map(|(enabled, name)| enabled.then_some(name))
    .collect();
    for (i, name) in enabled_names.iter().enumerate() {
        if enabled_names[..i].iter().any(|other| other.eq_ignore_ascii_case(name)) {
            return Err(ConfigError::ValidationError(format!(
                "venue name '{name}' is used by more than one venue"
            )));
        }
    }

    positive("venues.keeper.probe_interval_secs", venues.keeper.probe_interval_secs)?;
    if venues.keeper.reconnect_initial_ms > venues.keeper.reconnect_max_ms {
        return Err(ConfigError::ValidationError(
            "venues.keeper.reconnect_initial_ms must not exceed reconnect_max_ms".to_string(),
        ));
    }

    if config.persistence.backend == PersistenceBackend::Postgres
        && config
            .persistence
            .database_url
            .as_deref()
            .is_none_or(str::is_empty)
    {
        return Err(ConfigError::ValidationError(
            "persistence.database_url is required for the postgres backend".to_string(),
        ));
    }

    positive("queue.poll_interval_ms", config.queue.poll_interval_ms)?;
    positive("queue.visibility_timeout_secs", config.queue.visibility_timeout_secs)?;
    positive(
        "orchestrator.place_order_timeout_secs",
        config.orchestrator.place_order_timeout_secs,
    )?;
    positive(
        "orchestrator.order_poll_interval_ms",
        config.orchestrator.order_poll_interval_ms,
    )?;
    if config.reconciliation.enabled {
        positive("reconciliation.interval_secs", config.reconciliation.interval_secs)?;
    }

    Ok(())
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{field} is required when the venue is enabled"
        )));
    }
    Ok(())
}

fn positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ValidationError(format!("{field} must be positive")));
    }
    Ok(())
}
