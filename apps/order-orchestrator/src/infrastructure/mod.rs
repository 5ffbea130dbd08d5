//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - **Driven Adapters (Outbound)**
//!   - `venues/`: CFD gateway, spot exchange and FIX session adapters
//!   - `persistence/`: Order store, audit log and submission queue (in-memory, `PostgreSQL`)
//!   - `alerting/`: Slack and Telegram alert channels
//!
//! - **Wiring**
//!   - `config/`: Dependency injection container

pub mod alerting;
pub mod config;
pub mod persistence;
pub mod venues;
