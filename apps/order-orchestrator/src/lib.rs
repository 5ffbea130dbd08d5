// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Order Orchestrator - Rust Core Library
//!
//! Order orchestration and pre-trade risk core for multi-venue trading.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core business logic
//!   - `order_execution`: Order aggregate, status state machine, repository contract
//!   - `risk_management`: Risk profiles and pre-trade limit checks
//!   - `execution_tactics`: TWAP decomposition
//!   - `copy_trading`: Leader/follower subscriptions
//!   - `reconciliation`: Internal vs. venue trade comparison
//!   - `audit`: Append-only compliance trail
//!
//! - **Application**: Orchestration and port definitions
//!   - `ports`: `ExchangeAdapter`, `AuditSink`, `AlertSink`, `SubmissionQueue`, `TelemetrySink`
//!   - `services`: Adapter registry, market facade, smart order router, risk gate,
//!     copy trader, reconciler
//!   - `orchestrator`: Order creation, the submission worker, live/paper/TWAP paths
//!
//! - **Infrastructure**: Adapters (implementations)
//!   - `venues`: CFD gateway, spot exchange and FIX adapters
//!   - `persistence`: In-memory and `PostgreSQL` stores and queues
//!   - `alerting`: Slack and Telegram
//!   - `config`: Dependency injection container
//!
//! Cross-cutting: [`config`] (YAML loading), [`observability`] (tracing and
//! Prometheus metrics) and [`resilience`] (backoff).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Orchestration, services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting Concerns
// =============================================================================

/// YAML configuration with environment interpolation.
pub mod config;

/// Structured logging and metrics.
pub mod observability;

/// Retry and backoff policies.
pub mod resilience;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::order_execution::{Order, OrderSide, OrderStatus, OrderType, TwapParams};
pub use domain::risk_management::RiskProfile;
pub use domain::shared::{OrderId, UserId, VenueName};

// Application re-exports
pub use application::dto::{OrderDto, OrderIntent};
pub use application::orchestrator::{OrchestratorError, OrderOrchestrator};
pub use application::ports::{AdapterError, ConnectionStatus, ExchangeAdapter};

// Infrastructure re-exports
pub use infrastructure::config::{Container, ContainerError};
pub use infrastructure::venues::{CfdAdapter, FixAdapter, SpotAdapter};
