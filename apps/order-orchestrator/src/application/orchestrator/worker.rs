//! Submission worker.
//!
//! Consumes the submission queue one delivery at a time and processes each
//! order in its own task. Deliveries are at-least-once; an order that is no
//! longer `PENDING_SUBMIT` is skipped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use super::error::OrchestratorError;
use super::order_orchestrator::OrderOrchestrator;
use crate::application::ports::{AlertLevel, Delivery, QueueError};
use crate::domain::order_execution::OrderStatus;
use crate::domain::shared::OrderId;

impl OrderOrchestrator {
    /// Run the submission worker until cancelled.
    pub async fn run_worker(self: Arc<Self>) {
        info!("Submission worker started");
        loop {
            let delivery = tokio::select! {
                () = self.cancel.cancelled() => break,
                delivery = self.queue.dequeue() => delivery,
            };

            match delivery {
                Ok(delivery) => {
                    let this = Arc::clone(&self);
                    self.tasks.spawn(async move { this.handle_delivery(delivery).await });
                }
                Err(QueueError::Closed) => {
                    warn!("Submission queue closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to dequeue order");
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(self.settings.queue_error_backoff) => {}
                    }
                }
            }
        }
        info!("Submission worker stopped");
    }

    async fn handle_delivery(self: Arc<Self>, delivery: Delivery) {
        let order_id = delivery.order_id.clone();
        let outcome = AssertUnwindSafe(self.process_order(&order_id))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.handle_unexpected(&order_id, e.to_string()).await,
            Err(_) => {
                self.handle_unexpected(&order_id, "order task panicked".to_string())
                    .await;
            }
        }

        if let Err(e) = self.queue.ack(&delivery).await {
            error!(order_id = %order_id, error = %e, "Failed to acknowledge delivery");
        }
    }

    #[instrument(skip(self, order_id), fields(order_id = %order_id))]
    async fn process_order(self: &Arc<Self>, order_id: &OrderId) -> Result<(), OrchestratorError> {
        let Some(order) = self.orders.find_by_id(order_id).await? else {
            warn!("Queued order not found");
            return Ok(());
        };
        if order.status() != OrderStatus::PendingSubmit {
            debug!(status = %order.status(), "Order already processed, skipping delivery");
            return Ok(());
        }

        if order.is_paper_trade() {
            self.execute_paper(order).await
        } else {
            self.execute_live(order).await
        }
    }

    /// Move an order that hit an unexpected error to `ERROR` and alert.
    pub(super) async fn handle_unexpected(&self, order_id: &OrderId, reason: String) {
        error!(order_id = %order_id, error = %reason, "Unexpected error while processing order");
        match self.orders.find_by_id(order_id).await {
            Ok(Some(mut order)) if !order.status().is_terminal() => {
                let result = self
                    .fail_order(
                        &mut order,
                        format!("Unexpected error: {reason}"),
                        Some(AlertLevel::Critical),
                    )
                    .await;
                if let Err(e) = result {
                    error!(order_id = %order_id, error = %e, "Could not record order failure");
                }
            }
            Ok(_) => {
                self.alerts
                    .dispatch(
                        &format!("Order {order_id} hit an unexpected error: {reason}"),
                        AlertLevel::Critical,
                    )
                    .await;
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Could not reload failed order");
                self.alerts
                    .dispatch(
                        &format!("Order {order_id} hit an unexpected error: {reason}"),
                        AlertLevel::Critical,
                    )
                    .await;
            }
        }
    }
}
