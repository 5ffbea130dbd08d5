//! Application Layer
//!
//! Coordinates the domain with the outside world.
//!
//! - [`ports`]: Traits the infrastructure implements (venues, sinks, queue)
//! - [`services`]: Registry, market facade, router, risk gate, copy trading, reconciliation
//! - [`orchestrator`]: Order creation, the submission worker and execution paths
//! - [`dto`]: Inbound request types

pub mod dto;
pub mod orchestrator;
pub mod ports;
pub mod services;
