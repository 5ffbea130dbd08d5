//! Slack incoming-webhook payloads.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::application::ports::AlertLevel;

const fn color(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Info => "#3B82F6",
        AlertLevel::Warning => "#FBBF24",
        AlertLevel::Critical => "#EF4444",
    }
}

/// Attachment payload with a level-colored bar and a timestamp footer.
pub(super) fn payload(message: &str, level: AlertLevel, now: DateTime<Utc>) -> Value {
    json!({
        "attachments": [{
            "color": color(level),
            "blocks": [
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("*[{level}]* - Order Orchestrator\n{message}"),
                    },
                },
                {
                    "type": "context",
                    "elements": [{
                        "type": "mrkdwn",
                        "text": format!("Timestamp: {}", now.format("%Y-%m-%d %H:%M:%S UTC")),
                    }],
                },
            ],
        }],
    })
}
