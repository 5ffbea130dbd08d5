//! FIX 4.2 counterparty over TCP.
//!
//! One session per adapter: a heartbeat task and a listener task share a
//! `CancellationToken` that `disconnect()` cancels. The listener dispatches
//! inbound frames by MsgType and pushes execution reports to the
//! orchestrator's fill channel.

mod adapter;
mod codec;
mod listener;
mod session;

pub use adapter::FixAdapter;
