//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included (0 = unlimited).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff", with = "millis")]
    pub initial_backoff: Duration,
    /// Upper bound for a single delay.
    #[serde(default = "default_max_backoff", with = "millis")]
    pub max_backoff: Duration,
    /// Growth factor between delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff() -> Duration {
    Duration::from_millis(200)
}

const fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_jitter() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Unlimited attempts, used by the connection keeper.
    #[must_use]
    pub const fn unlimited(initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: 0,
            initial_backoff,
            max_backoff,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    /// Fixed attempts without jitter.
    #[must_use]
    pub const fn fixed(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff: initial_backoff,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Exponential backoff calculator.
#[derive(Debug)]
pub struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    current: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    /// Start a new sequence.
    #[must_use]
    pub const fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts,
            current: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
            jitter_factor: config.jitter_factor,
        }
    }

    /// Delay before the next attempt, or `None` when attempts are exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.max_attempts > 0 && self.attempt >= self.max_attempts {
            return None;
        }

        let delay = self.current;
        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * self.multiplier).min(self.max_backoff.as_secs_f64()),
        );
        Some(self.apply_jitter(delay))
    }

    /// Number of attempts made so far.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Restart the sequence after a success.
    pub fn reset(&mut self, config: &RetryConfig) {
        *self = Self::new(config);
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.jitter_factor <= 0.0 || duration.is_zero() {
            return duration;
        }
        let base_millis = duration.as_millis() as f64;
        let range = base_millis * self.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-range..=range);
        Duration::from_millis((base_millis + jitter).max(1.0) as u64)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
