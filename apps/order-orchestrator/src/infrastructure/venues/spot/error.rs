//! Spot venue errors.

use thiserror::Error;

use super::api_types::ApiErrorBody;
use crate::application::ports::AdapterError;
use crate::infrastructure::venues::http::HttpError;

/// Invalid symbol.
pub const INVALID_SYMBOL: i64 = -1121;
/// Unknown order on cancel.
pub const UNKNOWN_ORDER: i64 = -2011;
/// Unknown order on query.
pub const NO_SUCH_ORDER: i64 = -2013;

/// Spot venue error.
#[derive(Debug, Clone, Error)]
pub enum SpotError {
    /// Transport failure.
    #[error(transparent)]
    Http(HttpError),

    /// Venue returned a coded error.
    #[error("Venue error {code}: {msg}")]
    Api {
        /// Venue error code.
        code: i64,
        /// Venue message.
        msg: String,
    },

    /// Key or secret is not configured.
    #[error("API key/secret not configured")]
    MissingCredentials,
}

impl SpotError {
    /// Venue code, if the venue answered with one.
    #[must_use]
    pub const fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<HttpError> for SpotError {
    fn from(err: HttpError) -> Self {
        if let HttpError::Status { body, .. } = &err
            && let Ok(api) = serde_json::from_str::<ApiErrorBody>(body)
        {
            return Self::Api {
                code: api.code,
                msg: api.msg,
            };
        }
        Self::Http(err)
    }
}

impl From<SpotError> for AdapterError {
    fn from(err: SpotError) -> Self {
        match err {
            SpotError::Http(e) => e.into(),
            SpotError::MissingCredentials => Self::Authentication(err.to_string()),
            SpotError::Api { code, msg } => match code {
                -1022 | -2014 | -2015 => Self::Authentication(msg),
                INVALID_SYMBOL | -1102..=-1100 => Self::Validation(msg),
                -1003 | -1001 | -1000 => Self::Connection(msg),
                UNKNOWN_ORDER | NO_SUCH_ORDER => Self::Rejected(msg),
                _ => Self::Rejected(format!("{code}: {msg}")),
            },
        }
    }
}
