//! Risk Management Bounded Context
//!
//! Per-user risk profiles and the pure pre-trade limit checks.
//!
//! # Key Concepts
//!
//! - **Risk Profile**: Optional per-user limits; absence means no limits apply
//! - **Kill Switch**: Blocks all new orders without consulting market data
//! - **Exposure**: `volume * current price` summed over open positions

pub mod errors;
pub mod repository;
pub mod services;
pub mod value_objects;

pub use errors::{RiskCheck, RiskViolation};
pub use repository::RiskProfileRepository;
pub use services::PreTradeLimits;
pub use value_objects::{OpenExposure, RiskProfile};
