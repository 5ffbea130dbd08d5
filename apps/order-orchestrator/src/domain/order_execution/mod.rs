//! Order Execution Bounded Context
//!
//! Manages the order lifecycle from `PENDING_SUBMIT` to a terminal state.
//!
//! # Key Concepts
//!
//! - **Order Aggregate**: The root entity enforcing lifecycle invariants
//! - **State Machine**: The allowed status edges; terminal states are absorbing
//! - **Repository**: Atomic transition-plus-audit persistence

pub mod aggregate;
pub mod errors;
pub mod repository;
pub mod services;
pub mod value_objects;

pub use aggregate::{
    COPY_DEPTH_KEY, COPY_OF_ORDER_KEY, CreateOrderCommand, Order, OrderSnapshot, StatusChange,
};
pub use errors::OrderError;
pub use repository::{OrderRepository, RepositoryError};
pub use services::OrderStateMachine;
pub use value_objects::{OrderSide, OrderStatus, OrderType, TwapParams};
