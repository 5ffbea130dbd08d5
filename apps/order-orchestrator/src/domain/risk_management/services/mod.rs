//! Risk Management Domain Services

mod pre_trade_limits;

pub use pre_trade_limits::PreTradeLimits;
