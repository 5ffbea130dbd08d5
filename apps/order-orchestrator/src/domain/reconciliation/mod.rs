//! Reconciliation Bounded Context
//!
//! Compares internally filled orders with the venue's trade history for a time
//! window and classifies every difference.

mod report;

pub use report::{
    Discrepancy, DiscrepancyKind, ExternalFill, ReconciliationReport, ReconciliationStatus,
    compare_fills,
};
