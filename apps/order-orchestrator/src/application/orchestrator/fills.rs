//! Execution report handling.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::error::OrchestratorError;
use super::order_orchestrator::OrderOrchestrator;
use crate::application::ports::{AlertLevel, ExecutionReport, ExecutionReportKind};
use crate::domain::order_execution::{Order, OrderStatus};
use crate::resilience::ExponentialBackoff;

/// Result of one attempt to apply a report.
enum Attempt {
    Applied(Option<Order>),
    NotReady,
}

impl OrderOrchestrator {
    /// Consume execution reports until `cancel` fires or all senders are
    /// dropped.
    ///
    /// The listener takes its own token so reports keep flowing while
    /// [`shutdown`](Self::shutdown) drains in-flight orders. A report whose
    /// order is not accepted yet is parked on a tracked task and retried there
    /// without holding up the reports behind it.
    pub async fn run_fill_listener(
        self: Arc<Self>,
        mut reports: mpsc::UnboundedReceiver<ExecutionReport>,
        cancel: CancellationToken,
    ) {
        info!("Fill listener started");
        loop {
            let report = tokio::select! {
                () = cancel.cancelled() => break,
                report = reports.recv() => report,
            };
            let Some(report) = report else {
                debug!("Execution report channel closed");
                break;
            };
            match self.try_apply(&report).await {
                Ok(Attempt::Applied(_)) => {}
                Ok(Attempt::NotReady) => self.park_report(report),
                Err(e) if e.is_conflict() => self.park_report(report),
                Err(e) => self.report_dropped(&report, &e).await,
            }
        }
        info!("Fill listener stopped");
    }

    fn park_report(self: &Arc<Self>, report: ExecutionReport) {
        debug!(
            venue = %report.venue,
            exchange_order_id = %report.exchange_order_id,
            "Parking execution report"
        );
        let this = Arc::clone(self);
        self.tasks.spawn(async move {
            if let Err(e) = this.apply_execution_report(&report).await {
                this.report_dropped(&report, &e).await;
            }
        });
    }

    async fn report_dropped(&self, report: &ExecutionReport, e: &OrchestratorError) {
        error!(
            venue = %report.venue,
            exchange_order_id = %report.exchange_order_id,
            kind = ?report.kind,
            error = %e,
            "Execution report dropped"
        );
        let message = format!(
            "Execution report {} from {} dropped: {e}",
            report.exchange_order_id, report.venue
        );
        self.alerts.dispatch(&message, AlertLevel::Critical).await;
    }

    /// Apply an asynchronous execution report to its order.
    ///
    /// Reports that arrive before the order is `ACCEPTED` are retried a bounded
    /// number of times. Reports for finished orders are ignored. Returns the
    /// updated order, or `None` when nothing changed.
    pub async fn apply_execution_report(
        self: &Arc<Self>,
        report: &ExecutionReport,
    ) -> Result<Option<Order>, OrchestratorError> {
        let mut backoff = ExponentialBackoff::new(&self.settings.report_retry);
        loop {
            let outcome = self.try_apply(report).await;
            let retry_reason = match outcome {
                Ok(Attempt::Applied(order)) => return Ok(order),
                Ok(Attempt::NotReady) => "order not yet accepted".to_string(),
                Err(e) if e.is_conflict() => e.to_string(),
                Err(e) => return Err(e),
            };
            let Some(delay) = backoff.next_backoff() else {
                return Err(OrchestratorError::NotFound(format!(
                    "No accepted order for {} report {} after {} attempts",
                    report.venue,
                    report.exchange_order_id,
                    backoff.attempt()
                )));
            };
            debug!(
                exchange_order_id = %report.exchange_order_id,
                reason = %retry_reason,
                delay_ms = delay.as_millis(),
                "Retrying execution report"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn try_apply(self: &Arc<Self>, report: &ExecutionReport) -> Result<Attempt, OrchestratorError> {
        let _gate = self.report_gate.lock().await;
        let mut order = match self
            .orders
            .find_by_exchange_order_id(&report.exchange_order_id)
            .await?
        {
            Some(order) => order,
            None => match &report.client_order_id {
                Some(id) => match self.orders.find_by_id(id).await? {
                    Some(order) => order,
                    None => return Ok(Attempt::NotReady),
                },
                None => return Ok(Attempt::NotReady),
            },
        };

        if matches!(order.status(), OrderStatus::PendingSubmit | OrderStatus::Submitted) {
            return Ok(Attempt::NotReady);
        }
        if order.status().is_terminal() {
            debug!(
                order_id = %order.id(),
                status = %order.status(),
                "Ignoring report for finished order"
            );
            return Ok(Attempt::Applied(None));
        }

        match &report.kind {
            ExecutionReportKind::Fill { quantity, price } => {
                let quantity = (*quantity).min(order.remaining_quantity());
                if quantity <= Decimal::ZERO {
                    return Ok(Attempt::Applied(None));
                }
                self.record_fill(&mut order, &report.venue, quantity, *price)
                    .await?;
            }
            ExecutionReportKind::Canceled => {
                let now = Utc::now();
                self.commit(&mut order, |o| {
                    o.cancel(Some("Canceled by venue".to_string()), now)
                })
                .await?;
            }
            ExecutionReportKind::Rejected { reason } => {
                let reason = reason.clone();
                let alert = format!("Order {} rejected by {}: {reason}", order.id(), report.venue);
                self.commit(&mut order, |o| o.reject(reason)).await?;
                self.alerts.dispatch(&alert, AlertLevel::Warning).await;
            }
            ExecutionReportKind::Expired => {
                self.commit(&mut order, |o| o.expire(Some("Expired at venue".to_string())))
                    .await?;
            }
        }
        if order.status().is_terminal() && order.status() != OrderStatus::Filled {
            info!(order_id = %order.id(), status = %order.status(), "Order closed by venue");
        }
        Ok(Attempt::Applied(Some(order)))
    }
}
