//! HTTP executor shared by the REST venues.
//!
//! Reads retry with exponential backoff on network errors, 408/5xx and 429
//! (honoring `Retry-After`). Mutations are sent exactly once.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::application::ports::AdapterError;
use crate::resilience::{ExponentialBackoff, RetryConfig};

/// Transport-level failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    /// Connection could not be established or was reset.
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded the client timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Response body.
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// Retries exhausted.
    #[error("Max retries exceeded after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        last: String,
    },
}

impl From<HttpError> for AdapterError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Network(msg) => Self::Connection(msg),
            HttpError::Timeout(d) => Self::Timeout(d),
            HttpError::Decode(msg) => Self::Protocol(msg),
            HttpError::MaxRetriesExceeded { .. } => Self::Connection(err.to_string()),
            HttpError::Status { status, body } => match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Authentication(body),
                StatusCode::NOT_FOUND => Self::NotFound(body),
                s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                    Self::Connection(format!("HTTP {s}: {body}"))
                }
                _ => Self::Rejected(body),
            },
        }
    }
}

/// Error category for determining retry behavior.
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

/// Sends requests built by the caller and decodes JSON responses.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    timeout: Duration,
    retry: RetryConfig,
}

impl HttpExecutor {
    /// Create an executor with a per-request timeout.
    pub fn new(timeout: Duration, retry: RetryConfig) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::Network(e.to_string()))?;
        Ok(Self {
            client,
            timeout,
            retry,
        })
    }

    /// Underlying client for building requests.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Idempotent request; `build` runs once per attempt so signatures and
    /// timestamps stay fresh.
    pub async fn read<T: DeserializeOwned>(
        &self,
        build: impl Fn(&Client) -> RequestBuilder + Send + Sync,
    ) -> Result<T, HttpError> {
        let mut backoff = ExponentialBackoff::new(&self.retry);

        loop {
            let err = match self.send_once(build(&self.client)).await {
                Ok(text) => return decode(&text),
                Err(e) => e,
            };

            let delay = match &err.0 {
                HttpError::Network(_) | HttpError::Timeout(_) => backoff.next_backoff(),
                HttpError::Status { status, .. } => match categorize_status(*status) {
                    ErrorCategory::RateLimited => {
                        let hinted = err.1.map(Duration::from_secs);
                        backoff.next_backoff().map(|d| hinted.unwrap_or(d))
                    }
                    ErrorCategory::Retryable => backoff.next_backoff(),
                    ErrorCategory::NonRetryable => None,
                },
                HttpError::Decode(_) | HttpError::MaxRetriesExceeded { .. } => None,
            };

            match delay {
                Some(delay) => {
                    warn!(
                        error = %err.0,
                        delay_ms = delay.as_millis(),
                        attempt = backoff.attempt(),
                        "Retryable venue error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None if backoff.attempt() > 0 && is_transient(&err.0) => {
                    return Err(HttpError::MaxRetriesExceeded {
                        attempts: backoff.attempt(),
                        last: err.0.to_string(),
                    });
                }
                None => return Err(err.0),
            }
        }
    }

    /// Non-idempotent request, sent exactly once.
    pub async fn write<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, HttpError> {
        let text = self.send_once(request).await.map_err(|e| e.0)?;
        decode(&text)
    }

    /// One round trip. On failure also returns the `Retry-After` hint.
    async fn send_once(&self, request: RequestBuilder) -> Result<String, (HttpError, Option<u64>)> {
        let response = request.send().await.map_err(|e| (self.transport_error(&e), None))?;
        let status = response.status();

        if status.is_success() {
            return response
                .text()
                .await
                .map_err(|e| (self.transport_error(&e), None));
        }

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err((HttpError::Status { status, body }, retry_after))
    }

    fn transport_error(&self, e: &reqwest::Error) -> HttpError {
        if e.is_timeout() {
            HttpError::Timeout(self.timeout)
        } else {
            HttpError::Network(e.to_string())
        }
    }
}

const fn is_transient(err: &HttpError) -> bool {
    match err {
        HttpError::Network(_) | HttpError::Timeout(_) => true,
        HttpError::Status { status, .. } => !matches!(
            categorize_status(*status),
            ErrorCategory::NonRetryable
        ),
        HttpError::Decode(_) | HttpError::MaxRetriesExceeded { .. } => false,
    }
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, HttpError> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| HttpError::Decode(e.to_string()))
}
