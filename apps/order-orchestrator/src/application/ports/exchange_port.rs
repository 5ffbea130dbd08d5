//! Exchange Adapter Port (Driven Port)
//!
//! One capability interface over every execution venue. Each venue family has
//! exactly one implementation that absorbs its protocol's semantics (CFD
//! positions vs. spot balances, numeric return codes, FIX sessions).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::market_types::{Kline, SymbolInfo, Tick, Timeframe};
use super::trading_types::{
    AccountBalance, CancelResult, PlaceOrderRequest, PlaceOrderResult, Position, Trade,
    VenueOrderState,
};
use crate::domain::shared::VenueName;

/// Connection state of an adapter. Process-local, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No session.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Session established and healthy.
    Connected,
    /// Handshake rejected or session lost.
    Error,
}

impl ConnectionStatus {
    /// Returns true if the adapter may be handed out.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Exchange adapter error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// Venue unreachable or session lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Call exceeded its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Adapter is not connected.
    #[error("Adapter for {0} is not connected")]
    NotConnected(String),

    /// Credentials missing or refused.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Caller supplied an invalid argument.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Timeframe token has no venue equivalent.
    #[error("Unsupported timeframe '{0}' for this venue")]
    UnsupportedTimeframe(String),

    /// Venue declined the request.
    #[error("Rejected by venue: {0}")]
    Rejected(String),

    /// Venue does not know the referenced object.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or unexpected venue response.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl AdapterError {
    /// Connectivity failures that a read may retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

/// Port for a single execution venue.
///
/// Reads may return empty collections when the venue has no data but must
/// return an error when the venue is unreachable. `place_order` is never
/// retried; the request's `client_order_id` is the idempotency key.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Venue name this adapter serves.
    fn venue(&self) -> &VenueName;

    /// Establish the venue session. Idempotent.
    async fn connect(&self) -> Result<(), AdapterError>;

    /// Tear down the venue session and its background tasks. Idempotent.
    async fn disconnect(&self) -> Result<(), AdapterError>;

    /// Current connection status as last observed.
    fn status(&self) -> ConnectionStatus;

    /// Actively probe the venue and return the refreshed status.
    ///
    /// Defaults to the cached status for venues whose session already
    /// reflects liveness.
    async fn check_liveness(&self) -> ConnectionStatus {
        self.status()
    }

    /// Whether the venue publishes an instrument list.
    ///
    /// Venues without one accept any symbol and reject unknown ones through
    /// their own order acknowledgment.
    fn has_symbol_catalog(&self) -> bool {
        true
    }

    /// Metadata for all tradable instruments.
    async fn get_all_symbols(&self) -> Result<Vec<SymbolInfo>, AdapterError>;

    /// Metadata for one instrument, `None` if the venue does not list it.
    async fn get_symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>, AdapterError>;

    /// Best bid/ask/last, `None` if the venue has no quote.
    async fn get_latest_tick(&self, symbol: &str) -> Result<Option<Tick>, AdapterError>;

    /// OHLCV bars in `[start, end]`.
    async fn get_historical_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>, AdapterError>;

    /// Submit a new order.
    async fn place_order(&self, request: &PlaceOrderRequest)
    -> Result<PlaceOrderResult, AdapterError>;

    /// Cancel a working order.
    async fn cancel_order(
        &self,
        exchange_order_id: &str,
        symbol: &str,
    ) -> Result<CancelResult, AdapterError>;

    /// Whether fills and closures arrive on the execution report channel on
    /// their own. Orders at venues that do not push are polled.
    fn pushes_execution_reports(&self) -> bool {
        false
    }

    /// Venue view of one order, `None` if the venue does not know it.
    async fn get_order_state(
        &self,
        exchange_order_id: &str,
        symbol: &str,
    ) -> Result<Option<VenueOrderState>, AdapterError>;

    /// Open positions (synthesized from balances on spot venues).
    async fn get_open_positions(&self) -> Result<Vec<Position>, AdapterError>;

    /// Executions in `[start, end]`.
    async fn get_trade_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, AdapterError>;

    /// Account balance and equity.
    async fn get_account_balance(&self) -> Result<AccountBalance, AdapterError>;
}
