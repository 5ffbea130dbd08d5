//! Telegram bot API payloads.

use serde_json::{Value, json};

use crate::application::ports::AlertLevel;

const fn icon(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Info => "\u{2139}\u{fe0f}",
        AlertLevel::Warning => "\u{26a0}\u{fe0f}",
        AlertLevel::Critical => "\u{1f525}",
    }
}

/// Escape the characters MarkdownV2 reserves.
fn escape_markdown_v2(text: &str) -> String {
    const RESERVED: &[char] = &[
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
        '\\',
    ];
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `sendMessage` body.
pub(super) fn payload(chat_id: &str, message: &str, level: AlertLevel) -> Value {
    let text = format!(
        "*{} \\[{level}\\] \\- Order Orchestrator*\n\n{}",
        icon(level),
        escape_markdown_v2(message)
    );
    json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "MarkdownV2",
    })
}

/// `sendMessage` endpoint for a bot token.
pub(super) fn endpoint(api_base: &str, bot_token: &str) -> String {
    format!("{}/bot{bot_token}/sendMessage", api_base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape_markdown_v2("fill 1.5 (BTC-USD)!"), "fill 1\\.5 \\(BTC\\-USD\\)\\!");
    }

    #[test]
    fn payload_uses_markdown_v2() {
        let body = payload("42", "rejected.", AlertLevel::Warning);
        assert_eq!(body["chat_id"], "42");
        assert_eq!(body["parse_mode"], "MarkdownV2");
        let text = body["text"].as_str().unwrap();
        assert!(text.contains("\\[WARNING\\]"));
        assert!(text.ends_with("rejected\\."));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("https://api.telegram.org/", "T0K"),
            "https://api.telegram.org/botT0K/sendMessage"
        );
    }
}
