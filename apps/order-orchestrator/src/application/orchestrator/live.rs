//! Live execution path.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use super::error::OrchestratorError;
use super::order_orchestrator::OrderOrchestrator;
use crate::application::ports::{AdapterError, AlertLevel, PlaceOrderRequest, PlaceOrderResult};
use crate::application::services::MarketError;
use crate::domain::order_execution::Order;
use crate::domain::shared::VenueName;

/// How a venue answered `place_order`.
enum PlaceOutcome {
    Accepted(PlaceOrderResult),
    Rejected(String),
    Failed(String),
}

impl OrderOrchestrator {
    /// Submit a live order to its venue.
    #[instrument(skip(self, order), fields(order_id = %order.id(), venue = %order.venue()))]
    pub(super) async fn execute_live(self: &Arc<Self>, mut order: Order) -> Result<(), OrchestratorError> {
        if !self.mark_submitted(&mut order).await? {
            return Ok(());
        }

        let venue = match self.resolve_live_venue(&order).await {
            Ok(venue) => venue,
            Err(e) => {
                return self
                    .fail_order(&mut order, e.to_string(), Some(AlertLevel::Critical))
                    .await;
            }
        };
        if order.venue().is_auto() {
            order.route_to(venue.clone())?;
            info!(routed_to = %venue, "Smart-routed order");
        }

        let request = PlaceOrderRequest::for_order(&order);
        let started = Instant::now();
        let outcome = match tokio::time::timeout(
            self.settings.place_order_timeout,
            self.market.place_order(venue.as_str(), &request),
        )
        .await
        {
            Err(_) => PlaceOutcome::Failed(format!(
                "place_order timed out after {:?}",
                self.settings.place_order_timeout
            )),
            Ok(Err(MarketError::Adapter(AdapterError::Rejected(message)))) => {
                PlaceOutcome::Rejected(message)
            }
            Ok(Err(MarketError::SymbolNotFound(symbol))) => PlaceOutcome::Rejected(
                MarketError::SymbolNotFound(symbol).to_string(),
            ),
            Ok(Err(e)) => PlaceOutcome::Failed(e.to_string()),
            Ok(Ok(result)) if result.success => PlaceOutcome::Accepted(result),
            Ok(Ok(result)) => PlaceOutcome::Rejected(result.message),
        };
        self.telemetry
            .record_order_latency(&venue, started.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            PlaceOutcome::Accepted(result) => self.handle_accepted(order, &venue, result).await,
            PlaceOutcome::Rejected(message) => {
                warn!(reason = %message, "Venue rejected order");
                let alert = format!("Order {} rejected by {venue}: {message}", order.id());
                self.commit(&mut order, |o| o.reject(message)).await?;
                self.alerts.dispatch(&alert, AlertLevel::Warning).await;
                Ok(())
            }
            PlaceOutcome::Failed(message) => {
                self.fail_order(&mut order, message, Some(AlertLevel::Critical))
                    .await
            }
        }
    }

    /// Move to `SUBMITTED`. Returns `false` when a concurrent delivery won.
    pub(super) async fn mark_submitted(&self, order: &mut Order) -> Result<bool, OrchestratorError> {
        match self.commit(order, |o| o.submit(Utc::now())).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_conflict() => {
                debug!(order_id = %order.id(), "Order already claimed by another delivery");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_live_venue(&self, order: &Order) -> Result<VenueName, OrchestratorError> {
        if !order.venue().is_auto() {
            return Ok(order.venue().clone());
        }
        let plan = self
            .router
            .generate_execution_plan(order.symbol(), order.side(), order.quantity_requested())
            .await?;
        plan.into_iter()
            .next()
            .map(|leg| leg.venue)
            .ok_or_else(|| OrchestratorError::Internal("Empty execution plan".to_string()))
    }

    async fn handle_accepted(
        self: &Arc<Self>,
        mut order: Order,
        venue: &VenueName,
        result: PlaceOrderResult,
    ) -> Result<(), OrchestratorError> {
        let exchange_order_id = result.exchange_order_id.clone();
        self.commit(&mut order, |o| o.accept(exchange_order_id)).await?;
        info!(
            exchange_order_id = ?order.exchange_order_id(),
            retcode = result.retcode,
            "Order accepted by venue"
        );

        if !result.has_synchronous_fill() {
            return Ok(());
        }
        let quantity = result.filled_quantity.min(order.remaining_quantity());
        let price = result.fill_price.unwrap_or_default();
        self.record_fill(&mut order, venue, quantity, price).await
    }

    /// Apply one execution, emit fill telemetry and trigger copy trading.
    pub(super) async fn record_fill(
        self: &Arc<Self>,
        order: &mut Order,
        venue: &VenueName,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<(), OrchestratorError> {
        let now = Utc::now();
        self.commit(order, |o| o.apply_fill(quantity, price, now)).await?;
        if !order.is_paper_trade() {
            self.telemetry
                .record_fill(venue, order.symbol(), order.side(), quantity, price);
        }
        info!(
            order_id = %order.id(),
            quantity = %quantity,
            price = %price,
            status = %order.status(),
            "Fill applied"
        );
        self.fan_out_copies(order);
        Ok(())
    }
}
