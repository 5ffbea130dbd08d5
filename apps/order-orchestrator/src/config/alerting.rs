//! Alert channel configuration.

use serde::{Deserialize, Serialize};

/// Alert channels. A channel without credentials is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// Slack incoming webhook.
    #[serde(default)]
    pub slack: SlackConfig,
    /// Telegram bot.
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Per-request timeout.
    #[serde(default = "default_alert_timeout")]
    pub timeout_secs: u64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig::default(),
            telegram: TelegramConfig::default(),
            timeout_secs: default_alert_timeout(),
        }
    }
}

/// Slack configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Incoming webhook URL.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Telegram configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Target chat.
    #[serde(default)]
    pub chat_id: Option<String>,
    /// Bot API base URL.
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_telegram_api(),
        }
    }
}

const fn default_alert_timeout() -> u64 {
    10
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}
