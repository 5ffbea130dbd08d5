//! Alert Channels
//!
//! Every alert is logged; Slack and Telegram receive it when configured.
//! Channel failures are logged and never reach the caller.

mod slack;
mod telegram;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::application::ports::{AlertLevel, AlertSink};
use crate::config::AlertingConfig;

#[derive(Debug, Clone)]
struct TelegramTarget {
    endpoint: String,
    chat_id: String,
}

/// [`AlertSink`] fanning out to every configured channel.
#[derive(Debug, Clone)]
pub struct AlertDispatcher {
    client: Client,
    slack_webhook: Option<String>,
    telegram: Option<TelegramTarget>,
}

impl AlertDispatcher {
    /// Build from configuration. Channels without credentials are skipped.
    pub fn new(config: &AlertingConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let slack_webhook = config
            .slack
            .webhook_url
            .clone()
            .filter(|url| !url.trim().is_empty());

        let telegram = match (&config.telegram.bot_token, &config.telegram.chat_id) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
                Some(TelegramTarget {
                    endpoint: telegram::endpoint(&config.telegram.api_base, token),
                    chat_id: chat_id.clone(),
                })
            }
            _ => None,
        };

        Ok(Self {
            client,
            slack_webhook,
            telegram,
        })
    }

    /// Log-only dispatcher.
    #[must_use]
    pub fn log_only() -> Self {
        Self {
            client: Client::new(),
            slack_webhook: None,
            telegram: None,
        }
    }

    async fn post(&self, channel: &'static str, url: &str, body: &Value) {
        match self.client.post(url).json(body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                error!(channel, status = %resp.status(), "Alert channel refused message");
            }
            Err(e) => {
                error!(channel, error = %e, "Failed to send alert");
            }
        }
    }

    async fn send_slack(&self, message: &str, level: AlertLevel) {
        if let Some(url) = &self.slack_webhook {
            let body = slack::payload(message, level, Utc::now());
            self.post("slack", url, &body).await;
        }
    }

    async fn send_telegram(&self, message: &str, level: AlertLevel) {
        if let Some(target) = &self.telegram {
            let body = telegram::payload(&target.chat_id, message, level);
            self.post("telegram", &target.endpoint, &body).await;
        }
    }
}

#[async_trait]
impl AlertSink for AlertDispatcher {
    async fn dispatch(&self, message: &str, level: AlertLevel) {
        match level {
            AlertLevel::Info => info!(%level, "Alert: {message}"),
            AlertLevel::Warning => warn!(%level, "Alert: {message}"),
            AlertLevel::Critical => error!(%level, "Alert: {message}"),
        }

        tokio::join!(
            self.send_slack(message, level),
            self.send_telegram(message, level)
        );
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{SlackConfig, TelegramConfig};

    fn config(server: &MockServer) -> AlertingConfig {
        AlertingConfig {
            slack: SlackConfig {
                webhook_url: Some(format!("{}/slack/hook", server.uri())),
            },
            telegram: TelegramConfig {
                bot_token: Some("T0K".to_string()),
                chat_id: Some("42".to_string()),
                api_base: server.uri(),
            },
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn dispatch_reaches_both_channels() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slack/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botT0K/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "42",
                "parse_mode": "MarkdownV2"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = AlertDispatcher::new(&config(&server)).unwrap();
        dispatcher.dispatch("Order failed", AlertLevel::Critical).await;
    }

    #[tokio::test]
    async fn channel_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let dispatcher = AlertDispatcher::new(&config(&server)).unwrap();
        dispatcher.dispatch("still returns", AlertLevel::Warning).await;
    }

    #[tokio::test]
    async fn unconfigured_channels_are_skipped() {
        let dispatcher = AlertDispatcher::new(&AlertingConfig::default()).unwrap();
        assert!(dispatcher.slack_webhook.is_none());
        assert!(dispatcher.telegram.is_none());
        dispatcher.dispatch("log only", AlertLevel::Info).await;
    }
}
