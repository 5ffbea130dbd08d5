//! Execution Tactics Bounded Context
//!
//! Decomposition of algorithmic parent orders into child orders.

mod twap;

pub use twap::TwapSchedule;
