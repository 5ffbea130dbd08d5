//! Order Orchestrator
//!
//! Validates, persists and enqueues trade intents, then drives each order
//! through the live, paper or TWAP path. Fills arrive synchronously from the
//! place result or asynchronously from the adapters' execution-report channel.
//!
//! Pre-trade failures are returned to the caller and never persisted. Once an
//! order exists, every failure becomes a state transition with its own audit.

mod error;
mod fills;
mod live;
mod order_orchestrator;
mod paper;
mod polling;
mod twap;
mod worker;

pub use error::OrchestratorError;
pub use order_orchestrator::{OrchestratorDeps, OrchestratorSettings, OrderOrchestrator};
