//! Persistence Adapters
//!
//! Order store, audit log, risk profiles, copy subscriptions, reconciliation
//! reports and the submission queue, in memory or on PostgreSQL.

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryQueue, InMemoryStore};
pub use postgres::{PostgresQueue, PostgresStore, connect_pool};
