//! Binance-compatible spot exchange over signed REST.
//!
//! Spot accounts hold balances, not positions: open positions are synthesized
//! from non-zero asset balances and valued at the latest tick.

mod adapter;
mod api_types;
mod error;
mod signing;

pub use adapter::SpotAdapter;
pub use error::SpotError;
