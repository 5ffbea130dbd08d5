//! Venue name value object.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of an execution venue, or `auto` for smart-routed orders.
///
/// Names are normalized to lowercase so registry lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VenueName(String);

impl VenueName {
    /// The routing placeholder resolved by the smart order router.
    pub const AUTO: &'static str = "auto";

    /// Create a venue name (normalized to lowercase).
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_lowercase())
    }

    /// The `auto` routing placeholder.
    #[must_use]
    pub fn auto() -> Self {
        Self(Self::AUTO.to_string())
    }

    /// Whether this venue must be resolved by the smart order router.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.0 == Self::AUTO
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VenueName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for VenueName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<VenueName> for String {
    fn from(value: VenueName) -> Self {
        value.0
    }
}
