//! Domain Layer
//!
//! The innermost layer containing business logic with zero infrastructure dependencies.
//! This layer defines:
//!
//! - **Aggregates**: The `Order` consistency boundary and its lifecycle invariants
//! - **Value Objects**: Identifiers, status, side and kind
//! - **Domain Services**: Stateless business logic (state machine, risk checks, TWAP schedule)
//! - **Repository Traits**: Persistence abstractions (implemented in infrastructure)
//!
//! # Bounded Contexts
//!
//! - [`order_execution`]: Order lifecycle management
//! - [`risk_management`]: Per-user risk profiles and pre-trade limit checks
//! - [`execution_tactics`]: TWAP decomposition of algorithmic orders
//! - [`audit`]: Append-only compliance trail
//! - [`copy_trading`]: Leader/follower subscriptions and copy sizing
//! - [`reconciliation`]: Internal vs. venue trade comparison

pub mod audit;
pub mod copy_trading;
pub mod execution_tactics;
pub mod order_execution;
pub mod reconciliation;
pub mod risk_management;
pub mod shared;
