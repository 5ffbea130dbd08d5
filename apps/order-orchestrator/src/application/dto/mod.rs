//! Data Transfer Objects
//!
//! Shapes crossing the orchestrator boundary.

mod order_dto;

pub use order_dto::{OrderDto, OrderIntent};
