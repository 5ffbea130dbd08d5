//! Orchestrator state and external entry points.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::error::OrchestratorError;
use crate::application::dto::OrderIntent;
use crate::application::ports::{AlertLevel, AlertSink, Position, SubmissionQueue, TelemetrySink, Trade};
use crate::application::services::{CopyTrader, MarketFacade, RiskGate, SmartOrderRouter};
use crate::domain::audit::NewAuditEntry;
use crate::domain::order_execution::{Order, OrderError, OrderRepository, OrderStatus, StatusChange};
use crate::domain::shared::{OrderId, UserId, VenueName};
use crate::resilience::RetryConfig;

/// Tunables of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Upper bound for a venue `place_order` call.
    pub place_order_timeout: Duration,
    /// Paper path delay between `SUBMITTED` and `ACCEPTED`.
    pub paper_submit_delay: Duration,
    /// Paper path delay between `ACCEPTED` and `FILLED`.
    pub paper_fill_delay: Duration,
    /// Retries for execution reports that arrive before the order is accepted.
    pub report_retry: RetryConfig,
    /// How long shutdown waits for in-flight order tasks.
    pub shutdown_grace: Duration,
    /// Delay after a queue backend error.
    pub queue_error_backoff: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            place_order_timeout: Duration::from_secs(30),
            paper_submit_delay: Duration::from_millis(200),
            paper_fill_delay: Duration::from_millis(500),
            report_retry: RetryConfig::fixed(5, Duration::from_millis(200)),
            shutdown_grace: Duration::from_secs(10),
            queue_error_backoff: Duration::from_secs(1),
        }
    }
}

/// Collaborators of the orchestrator.
pub struct OrchestratorDeps {
    /// Order store.
    pub orders: Arc<dyn OrderRepository>,
    /// Submission queue.
    pub queue: Arc<dyn SubmissionQueue>,
    /// Pre-trade risk gate.
    pub risk: Arc<RiskGate>,
    /// Venue-agnostic market access.
    pub market: MarketFacade,
    /// Smart order router.
    pub router: SmartOrderRouter,
    /// Copy-trade planner.
    pub copy_trader: Arc<CopyTrader>,
    /// Operational alerts.
    pub alerts: Arc<dyn AlertSink>,
    /// Latency and fill telemetry.
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// The order orchestrator.
pub struct OrderOrchestrator {
    pub(super) orders: Arc<dyn OrderRepository>,
    pub(super) queue: Arc<dyn SubmissionQueue>,
    pub(super) risk: Arc<RiskGate>,
    pub(super) market: MarketFacade,
    pub(super) router: SmartOrderRouter,
    pub(super) copy_trader: Arc<CopyTrader>,
    pub(super) alerts: Arc<dyn AlertSink>,
    pub(super) telemetry: Arc<dyn TelemetrySink>,
    pub(super) settings: OrchestratorSettings,
    pub(super) cancel: CancellationToken,
    pub(super) tasks: TaskTracker,
    /// Serializes execution report application; transitions compare status only.
    pub(super) report_gate: Mutex<()>,
}

impl OrderOrchestrator {
    /// Create an orchestrator. Background tasks stop when `cancel` fires.
    #[must_use]
    pub fn new(
        deps: OrchestratorDeps,
        settings: OrchestratorSettings,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            orders: deps.orders,
            queue: deps.queue,
            risk: deps.risk,
            market: deps.market,
            router: deps.router,
            copy_trader: deps.copy_trader,
            alerts: deps.alerts,
            telemetry: deps.telemetry,
            settings,
            cancel,
            tasks: TaskTracker::new(),
            report_gate: Mutex::new(()),
        })
    }

    /// Token cancelled on shutdown.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Validate, persist and enqueue a trade intent.
    ///
    /// Algorithmic intents start a TWAP task instead of being enqueued.
    pub async fn create_order(
        self: &Arc<Self>,
        user_id: &UserId,
        intent: OrderIntent,
    ) -> Result<Order, OrchestratorError> {
        self.risk.validate_pre_trade(user_id, &intent).await?;

        let command = intent.into_command(user_id.clone(), None);
        command.validate()?;
        self.ensure_venue_available(command.venue.as_str())?;

        let order = Order::new(command, Utc::now())?;
        self.orders
            .insert(&order, NewAuditEntry::order_created(&order))
            .await?;
        info!(
            order_id = %order.id(),
            user_id = %user_id,
            venue = %order.venue(),
            symbol = %order.symbol(),
            side = %order.side(),
            quantity = %order.quantity_requested(),
            paper = order.is_paper_trade(),
            "Order created"
        );

        if order.is_algorithmic() {
            self.spawn_twap(order.clone());
        } else {
            self.enqueue_or_fail(&order).await?;
        }
        Ok(order)
    }

    /// Load an order.
    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order, OrchestratorError> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("Order {order_id}")))
    }

    /// Open positions at a venue.
    pub async fn get_open_positions(&self, venue: &str) -> Result<Vec<Position>, OrchestratorError> {
        Ok(self.market.get_open_positions(venue).await?)
    }

    /// Venue executions in a window.
    pub async fn get_trade_history(
        &self,
        venue: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, OrchestratorError> {
        Ok(self.market.get_trade_history(venue, start, end).await?)
    }

    /// Cancel a working order.
    ///
    /// Orders not yet at the venue (pending, algorithmic parents, paper) are
    /// canceled locally; venue orders are canceled at the venue first.
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, OrchestratorError> {
        let mut order = self.get_order(order_id).await?;
        if order.status().is_terminal() {
            return Err(OrchestratorError::Validation(format!(
                "Order {order_id} is already {}",
                order.status()
            )));
        }
        if order.status() == OrderStatus::Submitted {
            return Err(OrchestratorError::Validation(format!(
                "Order {order_id} is awaiting venue acknowledgement"
            )));
        }

        let at_venue = !order.is_paper_trade() && order.exchange_order_id().is_some();
        if at_venue {
            let exchange_order_id = order.exchange_order_id().unwrap_or_default().to_string();
            let result = self
                .market
                .cancel_order(order.venue().as_str(), &exchange_order_id, order.symbol())
                .await?;
            info!(order_id = %order_id, venue_status = %result.status, "Venue canceled order");
        }

        let reason = Some("Canceled by user".to_string());
        self.commit(&mut order, |o| o.cancel(reason, Utc::now())).await?;
        Ok(order)
    }

    /// Re-drive orders left pending by a previous run.
    ///
    /// Returns how many orders were resumed.
    pub async fn recover_pending(self: &Arc<Self>) -> Result<usize, OrchestratorError> {
        let pending = self.orders.find_by_status(OrderStatus::PendingSubmit).await?;
        let count = pending.len();
        for order in pending {
            if order.is_algorithmic() {
                self.spawn_twap(order);
            } else if let Err(e) = self.queue.enqueue(order.id()).await {
                error!(order_id = %order.id(), error = %e, "Failed to re-enqueue pending order");
            }
        }

        let in_flight = self.orders.find_by_status(OrderStatus::Submitted).await?;
        for order in &in_flight {
            warn!(
                order_id = %order.id(),
                venue = %order.venue(),
                "Order was submitted before restart; outcome unknown until reconciliation"
            );
        }
        if !in_flight.is_empty() {
            self.alerts
                .dispatch(
                    &format!(
                        "{} order(s) were in flight at restart and need reconciliation",
                        in_flight.len()
                    ),
                    AlertLevel::Warning,
                )
                .await;
        }

        info!(resumed = count, "Pending order recovery complete");
        Ok(count)
    }

    /// Stop background tasks and wait for in-flight orders up to the grace period.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        if tokio::time::timeout(self.settings.shutdown_grace, self.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.tasks.len(),
                "Shutdown grace period elapsed with order tasks still running"
            );
        }
    }

    // ========================================================================
    // Internals shared by the execution paths
    // ========================================================================

    /// Apply a transition and persist it with its audit record.
    pub(super) async fn commit<F>(
        &self,
        order: &mut Order,
        transition: F,
    ) -> Result<StatusChange, OrchestratorError>
    where
        F: FnOnce(&mut Order) -> Result<StatusChange, OrderError>,
    {
        let expected = order.status();
        let change = transition(order).map_err(|e| OrchestratorError::Internal(e.to_string()))?;
        self.orders
            .save_transition(order, expected, NewAuditEntry::state_change(order, change))
            .await?;
        info!(
            order_id = %order.id(),
            from = %change.from,
            to = %change.to,
            "Order transitioned"
        );
        Ok(change)
    }

    /// Move an order to `ERROR` and optionally alert.
    pub(super) async fn fail_order(
        &self,
        order: &mut Order,
        reason: String,
        alert: Option<AlertLevel>,
    ) -> Result<(), OrchestratorError> {
        error!(order_id = %order.id(), reason = %reason, "Order failed");
        let message = format!("Order {} failed: {reason}", order.id());
        self.commit(order, |o| o.fail(reason)).await?;
        if let Some(level) = alert {
            self.alerts.dispatch(&message, level).await;
        }
        Ok(())
    }

    pub(super) async fn enqueue_or_fail(&self, order: &Order) -> Result<(), OrchestratorError> {
        if let Err(e) = self.queue.enqueue(order.id()).await {
            let mut failed = order.clone();
            self.fail_order(
                &mut failed,
                format!("Failed to enqueue order: {e}"),
                Some(AlertLevel::Critical),
            )
            .await?;
            return Err(e.into());
        }
        Ok(())
    }

    fn ensure_venue_available(&self, venue: &str) -> Result<(), OrchestratorError> {
        let registry = self.market.registry();
        if VenueName::new(venue).is_auto() {
            if registry.get_all_active_adapters().is_empty() {
                return Err(OrchestratorError::Connectivity(
                    "No active venues available for smart routing".to_string(),
                ));
            }
            return Ok(());
        }
        self.market.adapter(venue)?;
        Ok(())
    }

    /// Start copy-trade fan-out for a leader's filled order.
    pub(super) fn fan_out_copies(self: &Arc<Self>, leader_order: &Order) {
        if !self.copy_trader.should_fan_out(leader_order) {
            return;
        }
        let this = Arc::clone(self);
        let leader_order = leader_order.clone();
        self.tasks.spawn(async move {
            for follower in this.copy_trader.plan_copies(&leader_order).await {
                match this
                    .create_order(&follower.follower_id, follower.intent)
                    .await
                {
                    Ok(order) => info!(
                        leader_order_id = %leader_order.id(),
                        follower_id = %follower.follower_id,
                        order_id = %order.id(),
                        "Copy trade created"
                    ),
                    Err(e) => warn!(
                        leader_order_id = %leader_order.id(),
                        follower_id = %follower.follower_id,
                        error = %e,
                        "Copy trade not created"
                    ),
                }
            }
        });
    }
}
