//! Reconciler
//!
//! Compares internally filled orders with each venue's trade history.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::market_facade::MarketFacade;
use crate::application::ports::{
    AlertLevel, AlertSink, AuditSink, ReconciliationReportRepository, TelemetrySink,
};
use crate::domain::audit::{AuditAction, NewAuditEntry, to_metadata_value};
use crate::domain::order_execution::OrderRepository;
use crate::domain::reconciliation::{
    ExternalFill, ReconciliationReport, ReconciliationStatus, compare_fills,
};
use crate::domain::shared::VenueName;

/// Reconciles internal fills against venue trade history.
pub struct Reconciler {
    orders: Arc<dyn OrderRepository>,
    market: MarketFacade,
    reports: Arc<dyn ReconciliationReportRepository>,
    audit: Arc<dyn AuditSink>,
    alerts: Arc<dyn AlertSink>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Reconciler {
    /// Create a reconciler.
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        market: MarketFacade,
        reports: Arc<dyn ReconciliationReportRepository>,
        audit: Arc<dyn AuditSink>,
        alerts: Arc<dyn AlertSink>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            orders,
            market,
            reports,
            audit,
            alerts,
            telemetry,
        }
    }

    /// Reconcile one venue for `[start, end]`.
    pub async fn reconcile_venue(
        &self,
        venue: &VenueName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ReconciliationReport {
        let started_at = Utc::now();
        info!(venue = %venue, %start, %end, "Reconciliation started");

        let report = match self.compare(venue, start, end, started_at).await {
            Ok(report) => report,
            Err(message) => {
                error!(venue = %venue, error = %message, "Reconciliation failed");
                ReconciliationReport::failed(venue.clone(), start, end, started_at, message)
            }
        };

        if let Err(e) = self.reports.save(&report).await {
            error!(venue = %venue, error = %e, "Failed to persist reconciliation report");
        }

        self.telemetry
            .record_reconciliation(venue, report.status.as_str());
        let summary = report.summary();
        self.audit
            .record(
                NewAuditEntry::new(None, AuditAction::ReconciliationRun, summary.clone())
                    .with("venue", venue.as_str())
                    .with("status", report.status.as_str())
                    .with("report", to_metadata_value(&report)),
            )
            .await;

        if report.status == ReconciliationStatus::Success {
            info!(venue = %venue, matched = report.matched, "Reconciliation clean");
        } else {
            warn!(venue = %venue, status = report.status.as_str(), "Reconciliation found discrepancies");
            self.alerts.dispatch(&summary, AlertLevel::Critical).await;
        }
        report
    }

    /// Reconcile every active venue for `[start, end]`.
    pub async fn reconcile_all(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<ReconciliationReport> {
        let mut reports = Vec::new();
        for venue in self.market.registry().active_venues() {
            reports.push(self.reconcile_venue(&venue, start, end).await);
        }
        reports
    }

    /// Reconcile all active venues every `interval` until cancelled.
    ///
    /// Each run covers the window since the previous run.
    pub async fn run_periodic(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        let mut window_start = Utc::now();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Reconciliation loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let window_end = Utc::now();
                    self.reconcile_all(window_start, window_end).await;
                    window_start = window_end;
                }
            }
        }
    }

    async fn compare(
        &self,
        venue: &VenueName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        started_at: DateTime<Utc>,
    ) -> Result<ReconciliationReport, String> {
        let internal = self
            .orders
            .find_filled_between(venue, start, end)
            .await
            .map_err(|e| format!("Failed to load internal orders: {e}"))?;

        let trades = self
            .market
            .get_trade_history(venue.as_str(), start, end)
            .await
            .map_err(|e| format!("Failed to fetch venue trade history: {e}"))?;

        let external = trades
            .into_iter()
            .map(|t| ExternalFill {
                exchange_order_id: t.exchange_order_id,
                volume: t.volume,
                price: t.price,
            })
            .collect();

        Ok(compare_fills(
            venue.clone(),
            start,
            end,
            started_at,
            &internal,
            external,
        ))
    }
}
