//! TWAP decomposition.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::OrchestratorError;
use super::order_orchestrator::OrderOrchestrator;
use crate::domain::audit::NewAuditEntry;
use crate::domain::execution_tactics::TwapSchedule;
use crate::domain::order_execution::{CreateOrderCommand, Order, OrderStatus, OrderType};

/// Metadata key of a child's position in its TWAP schedule.
const CHILD_INDEX_KEY: &str = "twap_child_index";

impl OrderOrchestrator {
    pub(super) fn spawn_twap(self: &Arc<Self>, parent: Order) {
        let this = Arc::clone(self);
        self.tasks.spawn(async move {
            let parent_id = parent.id().clone();
            let outcome = AssertUnwindSafe(this.run_twap(parent)).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => this.handle_unexpected(&parent_id, e.to_string()).await,
                Err(_) => {
                    this.handle_unexpected(&parent_id, "TWAP task panicked".to_string())
                        .await;
                }
            }
        });
    }

    /// Release equal children on a fixed interval until done, cancelled, or
    /// the parent leaves `ACCEPTED`.
    async fn run_twap(self: &Arc<Self>, mut parent: Order) -> Result<(), OrchestratorError> {
        let params = parent
            .twap_params()
            .ok_or_else(|| OrchestratorError::Validation("Missing TWAP parameters".to_string()))?;
        let schedule = TwapSchedule::new(parent.quantity_requested(), params)?;

        if parent.status() == OrderStatus::PendingSubmit {
            self.commit(&mut parent, |o| o.accept(None)).await?;
        }
        info!(
            order_id = %parent.id(),
            children = schedule.num_children,
            child_quantity = %schedule.child_quantity,
            interval_ms = schedule.interval.as_millis(),
            "TWAP started"
        );

        // First child one interval after start, last at the end of the window.
        let mut ticker =
            tokio::time::interval_at(Instant::now() + schedule.interval, schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        for index in 1..=schedule.num_children {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!(order_id = %parent.id(), released = index - 1, "TWAP cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.orders.find_by_id(parent.id()).await {
                Ok(Some(current)) if current.status() != OrderStatus::Accepted => {
                    info!(order_id = %parent.id(), status = %current.status(), "TWAP parent no longer working");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => warn!(order_id = %parent.id(), error = %e, "Could not reload TWAP parent"),
            }

            match self.release_child(&parent, index, schedule.child_quantity).await {
                Ok(child) => debug!(
                    order_id = %parent.id(),
                    child_id = %child.id(),
                    index,
                    venue = %child.venue(),
                    "TWAP child released"
                ),
                Err(e) => warn!(order_id = %parent.id(), index, error = %e, "TWAP child skipped"),
            }
        }
        info!(order_id = %parent.id(), "TWAP schedule complete");
        Ok(())
    }

    async fn release_child(
        &self,
        parent: &Order,
        index: u32,
        quantity: Decimal,
    ) -> Result<Order, OrchestratorError> {
        let plan = self
            .router
            .generate_execution_plan(parent.symbol(), parent.side(), quantity)
            .await?;
        let venue = plan
            .into_iter()
            .next()
            .map(|leg| leg.venue)
            .ok_or_else(|| OrchestratorError::Internal("Empty execution plan".to_string()))?;

        let mut metadata = Map::new();
        metadata.insert(CHILD_INDEX_KEY.to_string(), Value::from(index));

        let child = Order::new(
            CreateOrderCommand {
                user_id: parent.user_id().clone(),
                venue,
                symbol: parent.symbol().to_string(),
                order_type: OrderType::Market,
                side: parent.side(),
                quantity,
                price: None,
                is_paper_trade: parent.is_paper_trade(),
                is_algorithmic: false,
                parent_order_id: Some(parent.id().clone()),
                metadata,
            },
            Utc::now(),
        )?;
        self.orders
            .insert(&child, NewAuditEntry::order_created(&child))
            .await?;
        self.enqueue_or_fail(&child).await?;
        Ok(child)
    }
}
