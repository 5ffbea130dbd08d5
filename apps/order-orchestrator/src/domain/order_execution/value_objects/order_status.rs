//! Order status in the lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of an orchestrated order.
///
/// `PendingSubmit` is the single initial state. `Filled`, `Rejected`, `Canceled`,
/// `Expired` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Persisted, not yet sent to a venue.
    PendingSubmit,
    /// Sent to the venue, awaiting acknowledgment.
    Submitted,
    /// Venue accepted the order (working).
    Accepted,
    /// Some quantity has been executed.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Canceled before completion.
    Canceled,
    /// Venue declined the order.
    Rejected,
    /// Time-in-force elapsed.
    Expired,
    /// Unexpected failure after the order was persisted.
    Error,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 9] = [
        Self::PendingSubmit,
        Self::Submitted,
        Self::Accepted,
        Self::PartiallyFilled,
        Self::Filled,
        Self::Canceled,
        Self::Rejected,
        Self::Expired,
        Self::Error,
    ];

    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Rejected | Self::Expired | Self::Error
        )
    }

    /// Returns true if the order is working at a venue.
    #[must_use]
    pub const fn is_working(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::Accepted | Self::PartiallyFilled
        )
    }

    /// Returns true if the order can receive fills.
    #[must_use]
    pub const fn can_fill(&self) -> bool {
        matches!(self, Self::Accepted | Self::PartiallyFilled)
    }

    /// Stable persisted representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PendingSubmit => "PENDING_SUBMIT",
            Self::Submitted => "SUBMITTED",
            Self::Accepted => "ACCEPTED",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}
