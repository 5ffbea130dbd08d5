//! Reconciliation report types and the fill comparison.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::Order;
use crate::domain::shared::VenueName;

/// Absolute tolerance for quantity and price comparison.
const TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    /// Every record matched.
    Success,
    /// Mismatches or internal orders missing at the venue.
    Warning,
    /// Venue fills unknown internally, or the run itself failed.
    Failure,
}

impl ReconciliationStatus {
    /// Stable persisted representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Failure => "FAILURE",
        }
    }
}

/// Kind of difference found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Present on both sides with different quantity or price.
    Mismatch,
    /// Filled internally, absent at the venue.
    MissingExternal,
    /// Present at the venue, unknown internally.
    MissingInternal,
    /// The run could not complete.
    Error,
}

/// A single difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Kind of difference.
    pub kind: DiscrepancyKind,
    /// Venue order id (or empty for run errors).
    pub exchange_order_id: String,
    /// Human-readable detail.
    pub detail: String,
}

/// A fill reported by the venue, aggregated per venue order id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFill {
    /// Venue order id.
    pub exchange_order_id: String,
    /// Executed quantity.
    pub volume: Decimal,
    /// Execution price.
    pub price: Decimal,
}

/// Result of one reconciliation run for one venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Venue reconciled.
    pub venue: VenueName,
    /// Overall outcome.
    pub status: ReconciliationStatus,
    /// Window start.
    pub window_start: DateTime<Utc>,
    /// Window end.
    pub window_end: DateTime<Utc>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Internal filled orders checked.
    pub internal_checked: usize,
    /// Venue fills fetched.
    pub external_fetched: usize,
    /// Records equal on both sides.
    pub matched: usize,
    /// Records differing in quantity or price.
    pub mismatched: usize,
    /// Venue fills unknown internally.
    pub missing_internal: usize,
    /// Internal fills absent at the venue.
    pub missing_external: usize,
    /// Detailed differences.
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconciliationReport {
    /// A failed run with a single error discrepancy.
    #[must_use]
    pub fn failed(
        venue: VenueName,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        started_at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            venue,
            status: ReconciliationStatus::Failure,
            window_start,
            window_end,
            started_at,
            finished_at: Utc::now(),
            internal_checked: 0,
            external_fetched: 0,
            matched: 0,
            mismatched: 0,
            missing_internal: 0,
            missing_external: 0,
            discrepancies: vec![Discrepancy {
                kind: DiscrepancyKind::Error,
                exchange_order_id: String::new(),
                detail: message.into(),
            }],
        }
    }

    /// One-line summary for alerts and audit detail.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Reconciliation for {} completed with status: {}. {} mismatches, {} missing internal records, {} missing external records.",
            self.venue,
            self.status.as_str(),
            self.mismatched,
            self.missing_internal,
            self.missing_external
        )
    }
}

/// Compare internal filled orders with venue fills.
///
/// Orders without an exchange order id cannot be matched and count as missing
/// externally.
#[must_use]
pub fn compare_fills(
    venue: VenueName,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    started_at: DateTime<Utc>,
    internal: &[Order],
    external: Vec<ExternalFill>,
) -> ReconciliationReport {
    let external_fetched = external.len();
    let mut external_by_id: HashMap<String, ExternalFill> = HashMap::new();
    for fill in external {
        external_by_id
            .entry(fill.exchange_order_id.clone())
            .and_modify(|agg| {
                let volume = agg.volume + fill.volume;
                if !volume.is_zero() {
                    agg.price = (agg.price * agg.volume + fill.price * fill.volume) / volume;
                }
                agg.volume = volume;
            })
            .or_insert(fill);
    }

    let mut report = ReconciliationReport {
        venue,
        status: ReconciliationStatus::Success,
        window_start,
        window_end,
        started_at,
        finished_at: started_at,
        internal_checked: internal.len(),
        external_fetched,
        matched: 0,
        mismatched: 0,
        missing_internal: 0,
        missing_external: 0,
        discrepancies: Vec::new(),
    };

    for order in internal {
        let id = order.exchange_order_id().unwrap_or_default().to_string();
        let Some(ext) = external_by_id.remove(&id) else {
            report.missing_external += 1;
            report.discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::MissingExternal,
                detail: format!("Order {} not found in venue history", order.id()),
                exchange_order_id: id,
            });
            continue;
        };

        let mut details = Vec::new();
        if (order.quantity_filled() - ext.volume).abs() > TOLERANCE {
            details.push(format!(
                "volume internal={} external={}",
                order.quantity_filled(),
                ext.volume
            ));
        }
        let internal_price = order.average_fill_price().unwrap_or_default();
        if (internal_price - ext.price).abs() > TOLERANCE {
            details.push(format!("price internal={internal_price} external={}", ext.price));
        }

        if details.is_empty() {
            report.matched += 1;
        } else {
            report.mismatched += 1;
            report.discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::Mismatch,
                exchange_order_id: id,
                detail: details.join("; "),
            });
        }
    }

    let mut leftovers: Vec<_> = external_by_id.into_keys().collect();
    leftovers.sort();
    for id in leftovers {
        report.missing_internal += 1;
        report.discrepancies.push(Discrepancy {
            kind: DiscrepancyKind::MissingInternal,
            detail: "Venue fill has no internal order".to_string(),
            exchange_order_id: id,
        });
    }

    report.status = if report.missing_internal > 0 {
        ReconciliationStatus::Failure
    } else if report.mismatched > 0 || report.missing_external > 0 {
        ReconciliationStatus::Warning
    } else {
        ReconciliationStatus::Success
    };
    report.finished_at = Utc::now();
    report
}
