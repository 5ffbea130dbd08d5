//! Order store and submission queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    /// Process memory; state is lost on restart.
    Memory,
    /// PostgreSQL.
    Postgres,
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Storage engine.
    #[serde(default = "default_backend")]
    pub backend: PersistenceBackend,
    /// Connection string for `postgres`.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Pool size for `postgres`.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

const fn default_backend() -> PersistenceBackend {
    PersistenceBackend::Memory
}

const fn default_max_connections() -> u32 {
    10
}

/// Submission queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Poll interval of the durable queue when empty.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Unacknowledged entries become visible again after this long.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            visibility_timeout_secs: default_visibility_timeout(),
        }
    }
}

impl QueueConfig {
    /// Poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Visibility timeout.
    #[must_use]
    pub const fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

const fn default_poll_interval() -> u64 {
    500
}

const fn default_visibility_timeout() -> u64 {
    60
}
