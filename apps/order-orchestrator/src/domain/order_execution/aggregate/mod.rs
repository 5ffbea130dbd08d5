//! Order Aggregate

mod order;

pub use order::{
    COPY_DEPTH_KEY, COPY_OF_ORDER_KEY, CreateOrderCommand, Order, OrderSnapshot, StatusChange,
};
