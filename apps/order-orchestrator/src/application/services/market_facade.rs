//! Unified Market Facade
//!
//! Venue-agnostic call surface: every method names the venue and is resolved
//! through the [`AdapterRegistry`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::adapter_registry::AdapterRegistry;
use crate::application::ports::{
    AccountBalance, AdapterError, CancelResult, ExchangeAdapter, Kline, PlaceOrderRequest,
    PlaceOrderResult, Position, SymbolInfo, Tick, Timeframe, Trade, VenueOrderState,
};
use crate::domain::shared::VenueName;

/// Market facade errors.
#[derive(Debug, Clone, Error)]
pub enum MarketError {
    /// No connected adapter for the venue.
    #[error(
        "Venue '{venue}' is not available. Configured: [{}]. Active: [{}]",
        join(.configured),
        join(.active)
    )]
    VenueUnavailable {
        /// Requested venue.
        venue: String,
        /// All registered venues.
        configured: Vec<VenueName>,
        /// Currently connected venues.
        active: Vec<VenueName>,
    },

    /// Symbol unknown to the venue.
    #[error("Symbol does not exist on exchange: {0}")]
    SymbolNotFound(String),

    /// Adapter call failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

fn join(venues: &[VenueName]) -> String {
    venues
        .iter()
        .map(VenueName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Venue-agnostic market access.
#[derive(Clone)]
pub struct MarketFacade {
    registry: Arc<AdapterRegistry>,
}

impl MarketFacade {
    /// Create a facade over a registry.
    #[must_use]
    pub const fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// Underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Resolve the connected adapter for a venue.
    pub fn adapter(&self, venue: &str) -> Result<Arc<dyn ExchangeAdapter>, MarketError> {
        self.registry
            .get_adapter(venue)
            .ok_or_else(|| MarketError::VenueUnavailable {
                venue: venue.to_string(),
                configured: self.registry.configured_venues(),
                active: self.registry.active_venues(),
            })
    }

    /// All symbols of a venue.
    pub async fn get_all_symbols(&self, venue: &str) -> Result<Vec<SymbolInfo>, MarketError> {
        Ok(self.adapter(venue)?.get_all_symbols().await?)
    }

    /// Metadata of one symbol.
    pub async fn get_symbol_info(
        &self,
        venue: &str,
        symbol: &str,
    ) -> Result<Option<SymbolInfo>, MarketError> {
        Ok(self.adapter(venue)?.get_symbol_info(symbol).await?)
    }

    /// Latest tick of a symbol.
    pub async fn get_latest_tick(
        &self,
        venue: &str,
        symbol: &str,
    ) -> Result<Option<Tick>, MarketError> {
        Ok(self.adapter(venue)?.get_latest_tick(symbol).await?)
    }

    /// Historical bars of a symbol.
    pub async fn get_historical_klines(
        &self,
        venue: &str,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>, MarketError> {
        Ok(self
            .adapter(venue)?
            .get_historical_klines(symbol, timeframe, start, end)
            .await?)
    }

    /// Place an order after checking the symbol exists on the venue.
    ///
    /// The check is skipped for venues without an instrument list.
    pub async fn place_order(
        &self,
        venue: &str,
        request: &PlaceOrderRequest,
    ) -> Result<PlaceOrderResult, MarketError> {
        let adapter = self.adapter(venue)?;
        if adapter.has_symbol_catalog()
            && adapter.get_symbol_info(&request.symbol).await?.is_none()
        {
            return Err(MarketError::SymbolNotFound(request.symbol.clone()));
        }
        Ok(adapter.place_order(request).await?)
    }

    /// Cancel a working order.
    pub async fn cancel_order(
        &self,
        venue: &str,
        exchange_order_id: &str,
        symbol: &str,
    ) -> Result<CancelResult, MarketError> {
        Ok(self
            .adapter(venue)?
            .cancel_order(exchange_order_id, symbol)
            .await?)
    }

    /// Venue view of one order.
    pub async fn get_order_state(
        &self,
        venue: &str,
        exchange_order_id: &str,
        symbol: &str,
    ) -> Result<Option<VenueOrderState>, MarketError> {
        Ok(self
            .adapter(venue)?
            .get_order_state(exchange_order_id, symbol)
            .await?)
    }

    /// Open positions of a venue account.
    pub async fn get_open_positions(&self, venue: &str) -> Result<Vec<Position>, MarketError> {
        Ok(self.adapter(venue)?.get_open_positions().await?)
    }

    /// Executions in a window.
    pub async fn get_trade_history(
        &self,
        venue: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, MarketError> {
        Ok(self.adapter(venue)?.get_trade_history(start, end).await?)
    }

    /// Account balance of a venue.
    pub async fn get_account_balance(&self, venue: &str) -> Result<AccountBalance, MarketError> {
        Ok(self.adapter(venue)?.get_account_balance().await?)
    }
}
