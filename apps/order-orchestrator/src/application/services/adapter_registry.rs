//! Adapter Registry
//!
//! Owns every configured venue adapter, connects them at startup, and hands out
//! only the ones whose live status is `CONNECTED`.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::ports::{ConnectionStatus, ExchangeAdapter};
use crate::domain::shared::VenueName;
use crate::resilience::{ExponentialBackoff, RetryConfig};

/// Registry of venue adapters in registration order.
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
}

impl AdapterRegistry {
    /// Create a registry. Registration order is the SOR tie-break order.
    #[must_use]
    pub fn new(adapters: Vec<Arc<dyn ExchangeAdapter>>) -> Self {
        Self { adapters }
    }

    /// Connect every adapter concurrently and return the venues that came up.
    pub async fn startup_all(&self) -> Vec<VenueName> {
        info!(venues = self.adapters.len(), "Connecting venue adapters");

        let results = join_all(self.adapters.iter().map(|adapter| async move {
            let venue = adapter.venue().clone();
            match adapter.connect().await {
                Ok(()) => {
                    info!(venue = %venue, "Venue connected");
                    Some(venue)
                }
                Err(e) => {
                    error!(venue = %venue, error = %e, "Venue failed to connect");
                    None
                }
            }
        }))
        .await;

        let active: Vec<VenueName> = results.into_iter().flatten().collect();
        info!(active = ?active, "Venue startup complete");
        active
    }

    /// Connected adapter for `name` (case-insensitive).
    #[must_use]
    pub fn get_adapter(&self, name: &str) -> Option<Arc<dyn ExchangeAdapter>> {
        let wanted = VenueName::new(name);
        self.adapters
            .iter()
            .find(|a| *a.venue() == wanted)
            .filter(|a| a.status().is_connected())
            .cloned()
    }

    /// Snapshot of connected adapters in registration order.
    #[must_use]
    pub fn get_all_active_adapters(&self) -> Vec<Arc<dyn ExchangeAdapter>> {
        self.adapters
            .iter()
            .filter(|a| a.status().is_connected())
            .cloned()
            .collect()
    }

    /// Names of all registered adapters.
    #[must_use]
    pub fn configured_venues(&self) -> Vec<VenueName> {
        self.adapters.iter().map(|a| a.venue().clone()).collect()
    }

    /// Names of connected adapters.
    #[must_use]
    pub fn active_venues(&self) -> Vec<VenueName> {
        self.get_all_active_adapters()
            .iter()
            .map(|a| a.venue().clone())
            .collect()
    }

    /// Disconnect every connected adapter concurrently. Best-effort.
    pub async fn shutdown_all(&self) {
        let connected = self.get_all_active_adapters();
        info!(venues = connected.len(), "Disconnecting venue adapters");

        join_all(connected.iter().map(|adapter| async move {
            if let Err(e) = adapter.disconnect().await {
                warn!(venue = %adapter.venue(), error = %e, "Venue disconnect failed");
            }
        }))
        .await;
    }

    /// Probe liveness and reconnect dropped adapters until cancelled.
    ///
    /// Each adapter keeps its own backoff so one flapping venue does not delay
    /// the others.
    pub async fn run_connection_keeper(
        self: Arc<Self>,
        probe_interval: Duration,
        retry: RetryConfig,
        cancel: CancellationToken,
    ) {
        let mut backoffs: Vec<ExponentialBackoff> = self
            .adapters
            .iter()
            .map(|_| ExponentialBackoff::new(&retry))
            .collect();
        let mut next_attempt: Vec<tokio::time::Instant> =
            vec![tokio::time::Instant::now(); self.adapters.len()];

        let mut interval = tokio::time::interval(probe_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Connection keeper stopped");
                    break;
                }
                _ = interval.tick() => {}
            }

            for (idx, adapter) in self.adapters.iter().enumerate() {
                let status = adapter.check_liveness().await;
                if status.is_connected() {
                    backoffs[idx].reset(&retry);
                    continue;
                }
                if status == ConnectionStatus::Connecting
                    || tokio::time::Instant::now() < next_attempt[idx]
                {
                    continue;
                }

                warn!(venue = %adapter.venue(), status = %status, "Venue down, reconnecting");
                match adapter.connect().await {
                    Ok(()) => {
                        info!(venue = %adapter.venue(), "Venue reconnected");
                        backoffs[idx].reset(&retry);
                    }
                    Err(e) => {
                        let delay = backoffs[idx].next_backoff().unwrap_or(probe_interval);
                        warn!(
                            venue = %adapter.venue(),
                            error = %e,
                            attempt = backoffs[idx].attempt(),
                            delay_ms = delay.as_millis(),
                            "Reconnect failed"
                        );
                        next_attempt[idx] = tokio::time::Instant::now() + delay;
                    }
                }
            }
        }
    }
}
