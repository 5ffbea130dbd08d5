//! Order Execution Value Objects
//!
//! Immutable types for order management.

mod algo_params;
mod order_side;
mod order_status;
mod order_type;

pub use algo_params::TwapParams;
pub use order_side::OrderSide;
pub use order_status::OrderStatus;
pub use order_type::OrderType;
