//! Application services shared by the orchestrator.

mod adapter_registry;
mod copy_trader;
mod market_facade;
mod reconciler;
mod risk_gate;
mod smart_order_router;

pub use adapter_registry::AdapterRegistry;
pub use copy_trader::{CopyTrader, FollowerOrder};
pub use market_facade::{MarketError, MarketFacade};
pub use reconciler::Reconciler;
pub use risk_gate::{RiskError, RiskGate};
pub use smart_order_router::{BestQuote, ExecutionLeg, RoutingError, SmartOrderRouter};
