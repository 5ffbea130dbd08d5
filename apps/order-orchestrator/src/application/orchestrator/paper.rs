//! Paper trading path.
//!
//! Simulates a venue against live market data: submit, wait, accept with a
//! synthetic exchange id, wait, fill the whole quantity.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::error::OrchestratorError;
use super::order_orchestrator::OrderOrchestrator;
use crate::application::ports::Tick;
use crate::domain::order_execution::{Order, OrderType};
use crate::domain::shared::VenueName;

/// Synthetic exchange id of a paper order: `PAPER-` and 12 upper-case hex digits.
pub(super) fn paper_exchange_order_id() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("PAPER-{}", &hex[..12])
}

impl OrderOrchestrator {
    /// Simulate an order.
    #[instrument(skip(self, order), fields(order_id = %order.id(), venue = %order.venue()))]
    pub(super) async fn execute_paper(self: &Arc<Self>, mut order: Order) -> Result<(), OrchestratorError> {
        if !self.mark_submitted(&mut order).await? {
            return Ok(());
        }

        if let Err(e) = self.simulate(&mut order).await {
            warn!(error = %e, "Paper simulation failed");
            if !order.status().is_terminal() {
                self.fail_order(&mut order, format!("Paper trade simulation failed: {e}"), None)
                    .await?;
            }
        }
        Ok(())
    }

    async fn simulate(&self, order: &mut Order) -> Result<(), OrchestratorError> {
        tokio::time::sleep(self.settings.paper_submit_delay).await;

        let (venue, tick) = self.paper_quote(order).await?;
        if order.venue().is_auto() {
            order.route_to(venue)?;
        }

        let exchange_order_id = paper_exchange_order_id();
        self.commit(order, |o| o.accept(Some(exchange_order_id))).await?;

        tokio::time::sleep(self.settings.paper_fill_delay).await;

        let price = match (order.order_type(), order.price()) {
            (OrderType::Limit, Some(limit)) => limit,
            _ => tick.price_for(order.side()),
        };
        let quantity = order.remaining_quantity();
        let now = Utc::now();
        self.commit(order, |o| o.apply_fill(quantity, price, now)).await?;
        info!(price = %price, quantity = %quantity, "Paper order filled");
        Ok(())
    }

    async fn paper_quote(&self, order: &Order) -> Result<(VenueName, Tick), OrchestratorError> {
        if order.venue().is_auto() {
            return self
                .router
                .get_best_quote(order.symbol(), order.side())
                .await
                .map(|best| (best.venue, best.tick))
                .ok_or_else(|| {
                    OrchestratorError::Connectivity(format!(
                        "No market found for {} on any active venue",
                        order.symbol()
                    ))
                });
        }
        let tick = self
            .market
            .get_latest_tick(order.venue().as_str(), order.symbol())
            .await?
            .ok_or_else(|| {
                OrchestratorError::Connectivity(format!(
                    "No tick available for {} on {}",
                    order.symbol(),
                    order.venue()
                ))
            })?;
        Ok((order.venue().clone(), tick))
    }
}
