//! Lock-free connection status shared between an adapter and its tasks.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::application::ports::ConnectionStatus;

/// Atomic [`ConnectionStatus`].
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    /// Start `DISCONNECTED`.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Current status.
    pub fn get(&self) -> ConnectionStatus {
        match self.0.load(Ordering::Acquire) {
            1 => ConnectionStatus::Connecting,
            2 => ConnectionStatus::Connected,
            3 => ConnectionStatus::Error,
            _ => ConnectionStatus::Disconnected,
        }
    }

    /// Replace the status.
    pub fn set(&self, status: ConnectionStatus) {
        let raw = match status {
            ConnectionStatus::Disconnected => 0,
            ConnectionStatus::Connecting => 1,
            ConnectionStatus::Connected => 2,
            ConnectionStatus::Error => 3,
        };
        self.0.store(raw, Ordering::Release);
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
