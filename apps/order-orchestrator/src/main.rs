//! Order Orchestrator Binary
//!
//! Connects the configured venues, resumes pending orders and runs the
//! submission worker, fill listener, order status poller, connection keeper
//! and reconciliation loop until SIGINT or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin order-orchestrator -- config.yaml
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `ORCHESTRATOR_CONFIG`: Config file path when no argument is given (default: config.yaml)
//! - `RUST_LOG`: Log level (default: info)
//!
//! Any `${VAR}` referenced by the config file, typically:
//! - `SPOT_API_KEY`, `SPOT_API_SECRET`: Spot venue credentials
//! - `CFD_LOGIN`, `CFD_PASSWORD`, `CFD_SERVER`: CFD gateway account
//! - `FIX_USERNAME`, `FIX_PASSWORD`: FIX logon credentials
//! - `DATABASE_URL`: PostgreSQL connection string
//! - `SLACK_WEBHOOK_URL`, `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`: Alert channels

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use order_orchestrator::config::{Config, load_config};
use order_orchestrator::infrastructure::config::Container;
use order_orchestrator::observability::{
    MetricsConfig, init_metrics, init_tracing, update_active_venues,
};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Upper bound on waiting for background loops after cancellation.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ORCHESTRATOR_CONFIG").ok());
    let config = load_config(config_path.as_deref()).context("failed to load configuration")?;

    init_tracing(config.observability.log_format);
    log_config(&config);

    if config.observability.metrics_enabled {
        init_metrics(&MetricsConfig::with_port(config.observability.metrics_port))
            .context("failed to start metrics exporter")?;
        tracing::info!(port = config.observability.metrics_port, "Metrics exporter listening");
    }

    let container = Container::new(&config)
        .await
        .context("failed to build application")?;
    let registry = container.registry();
    let orchestrator = container.orchestrator();
    let cancel = container.cancellation_token().clone();

    let active = registry.startup_all().await;
    update_active_venues(active.len());
    if active.is_empty() {
        tracing::warn!("No venue connected; orders will be rejected until the keeper reconnects one");
    }

    let resumed = orchestrator
        .recover_pending()
        .await
        .context("failed to recover pending orders")?;
    tracing::info!(resumed, "Recovered pending orders");

    // Stopped only after the orchestrator has drained, so fills for in-flight
    // orders still land during shutdown.
    let fills_cancel = CancellationToken::new();

    let mut tasks = JoinSet::new();
    tasks.spawn(Arc::clone(&orchestrator).run_worker());
    if let Some(reports) = container.take_execution_reports().await {
        tasks.spawn(Arc::clone(&orchestrator).run_fill_listener(reports, fills_cancel.clone()));
    }
    tasks.spawn(Arc::clone(&orchestrator).run_order_status_poller(
        config.orchestrator.order_poll_interval(),
        container.execution_reports(),
        cancel.child_token(),
    ));
    tasks.spawn(Arc::clone(&registry).run_connection_keeper(
        config.venues.keeper.probe_interval(),
        config.venues.keeper.retry(),
        cancel.child_token(),
    ));
    if config.reconciliation.enabled {
        tasks.spawn(
            container
                .reconciler()
                .run_periodic(config.reconciliation.interval(), cancel.child_token()),
        );
    }

    tracing::info!("Order orchestrator ready");
    shutdown_signal().await;

    cancel.cancel();
    orchestrator.shutdown().await;
    fills_cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        tracing::warn!("Background tasks did not stop in time");
        tasks.abort_all();
    }
    registry.shutdown_all().await;

    tracing::info!("Order orchestrator stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the loaded configuration without secrets.
fn log_config(config: &Config) {
    tracing::info!(
        mode = %config.environment.mode,
        spot = config.venues.spot.enabled,
        cfd = config.venues.cfd.enabled,
        fix = config.venues.fix.enabled,
        persistence = ?config.persistence.backend,
        copy_trading = config.copy_trading.enabled,
        reconciliation = config.reconciliation.enabled,
        "Configuration loaded"
    );
}

/// Wait for SIGINT or SIGTERM.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; the process could not be
/// stopped gracefully otherwise.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
