//! CFD broker reached through an MT5 REST gateway.
//!
//! The gateway holds the terminal session; this adapter logs in with the
//! account login, password and trade server and receives a bearer token used
//! for every later call. A 401 marks the session lost so the connection
//! keeper logs in again.

mod adapter;
mod api_types;

pub use adapter::CfdAdapter;
pub use api_types::{TRADE_RETCODE_DONE, TRADE_RETCODE_DONE_PARTIAL, TRADE_RETCODE_PLACED};
