//! Shared kernel: types used across bounded contexts.

mod identifiers;
mod venue;

pub use identifiers::{OrderId, UserId};
pub use venue::VenueName;
