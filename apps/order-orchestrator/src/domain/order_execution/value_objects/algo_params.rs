//! Algorithmic execution parameters carried in order metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// TWAP parameters for an algorithmic parent order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapParams {
    /// Total execution window (minutes).
    pub duration_minutes: u32,
    /// Number of equal child orders.
    pub num_children: u32,
}

impl TwapParams {
    /// Metadata key for the execution window.
    pub const DURATION_KEY: &'static str = "duration_minutes";
    /// Metadata key for the child count.
    pub const CHILDREN_KEY: &'static str = "num_children";

    /// Create TWAP parameters.
    #[must_use]
    pub const fn new(duration_minutes: u32, num_children: u32) -> Self {
        Self {
            duration_minutes,
            num_children,
        }
    }

    /// Read parameters from an order's metadata map.
    #[must_use]
    pub fn from_metadata(metadata: &Map<String, Value>) -> Option<Self> {
        let read = |key: &str| {
            metadata
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
        };
        Some(Self::new(read(Self::DURATION_KEY)?, read(Self::CHILDREN_KEY)?))
    }

    /// Write parameters into an order's metadata map.
    pub fn write_to(&self, metadata: &mut Map<String, Value>) {
        metadata.insert(Self::DURATION_KEY.into(), self.duration_minutes.into());
        metadata.insert(Self::CHILDREN_KEY.into(), self.num_children.into());
    }

    /// Both values must be positive and leave at least one millisecond
    /// between consecutive children.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.num_children > 0 && u64::from(self.num_children) <= self.duration_millis()
    }

    /// Execution window in milliseconds.
    #[must_use]
    pub fn duration_millis(&self) -> u64 {
        u64::from(self.duration_minutes) * 60 * 1000
    }
}
