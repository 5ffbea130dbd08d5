//! Smart Order Router
//!
//! Picks the venue with the best executable quote: lowest ask for BUY, highest
//! bid for SELL. Ties go to the venue registered first.

use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::adapter_registry::AdapterRegistry;
use crate::application::ports::Tick;
use crate::domain::order_execution::OrderSide;
use crate::domain::shared::VenueName;

/// Routing errors.
#[derive(Debug, Clone, Error)]
pub enum RoutingError {
    /// No active venue quotes the symbol.
    #[error("No market found for {symbol} on any active venue")]
    NoMarket {
        /// Requested symbol.
        symbol: String,
    },
}

/// Best executable quote across venues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestQuote {
    /// Venue holding the quote.
    pub venue: VenueName,
    /// Executable price for the side.
    pub price: Decimal,
    /// Full tick.
    pub tick: Tick,
}

/// One leg of an execution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLeg {
    /// Venue to execute on.
    pub venue: VenueName,
    /// Share of the total quantity in percent.
    pub quantity_pct: Decimal,
    /// Quantity for this leg.
    pub quantity: Decimal,
    /// Why this venue was chosen.
    pub justification: String,
}

/// Smart order router over the active adapters.
#[derive(Clone)]
pub struct SmartOrderRouter {
    registry: Arc<AdapterRegistry>,
}

impl SmartOrderRouter {
    /// Create a router.
    #[must_use]
    pub const fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// Best quote for `symbol` across all active venues.
    ///
    /// Venues that fail or have no quote are skipped.
    pub async fn get_best_quote(&self, symbol: &str, side: OrderSide) -> Option<BestQuote> {
        let adapters = self.registry.get_all_active_adapters();
        let ticks = join_all(adapters.iter().map(|a| a.get_latest_tick(symbol))).await;

        let mut best: Option<BestQuote> = None;
        for (adapter, result) in adapters.iter().zip(ticks) {
            let tick = match result {
                Ok(Some(tick)) => tick,
                Ok(None) => {
                    debug!(venue = %adapter.venue(), symbol, "No quote on venue");
                    continue;
                }
                Err(e) => {
                    warn!(venue = %adapter.venue(), symbol, error = %e, "Quote fetch failed, skipping venue");
                    continue;
                }
            };

            let price = tick.price_for(side);
            let better = best.as_ref().is_none_or(|current| match side {
                OrderSide::Buy => price < current.price,
                OrderSide::Sell => price > current.price,
            });
            if better {
                best = Some(BestQuote {
                    venue: adapter.venue().clone(),
                    price,
                    tick,
                });
            }
        }
        best
    }

    /// Execution plan for an order. The whole quantity goes to the best venue.
    pub async fn generate_execution_plan(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<Vec<ExecutionLeg>, RoutingError> {
        let best = self
            .get_best_quote(symbol, side)
            .await
            .ok_or_else(|| RoutingError::NoMarket {
                symbol: symbol.to_string(),
            })?;

        Ok(vec![ExecutionLeg {
            venue: best.venue,
            quantity_pct: Decimal::ONE_HUNDRED,
            quantity,
            justification: format!("Best price ({}) found on this venue.", best.price),
        }])
    }
}
