//! Dependency Injection Container
//!
//! Builds every store, venue adapter and service from [`Config`] and wires them
//! into one [`OrderOrchestrator`].

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::orchestrator::{OrchestratorDeps, OrderOrchestrator};
use crate::application::ports::{
    AdapterError, AlertSink, AuditSink, ExchangeAdapter, ExecutionReport, ExecutionReportSender,
    ReconciliationReportRepository, SubmissionQueue, TelemetrySink,
};
use crate::application::services::{
    AdapterRegistry, CopyTrader, MarketFacade, Reconciler, RiskGate, SmartOrderRouter,
};
use crate::config::{Config, PersistenceBackend, VenuesConfig};
use crate::domain::copy_trading::CopySubscriptionRepository;
use crate::domain::order_execution::repository::{OrderRepository, RepositoryError};
use crate::domain::risk_management::repository::RiskProfileRepository;
use crate::infrastructure::alerting::AlertDispatcher;
use crate::infrastructure::persistence::{
    InMemoryQueue, InMemoryStore, PostgresQueue, PostgresStore, connect_pool,
};
use crate::infrastructure::venues::{CfdAdapter, FixAdapter, SpotAdapter};
use crate::observability::MetricsTelemetry;

/// Failure while wiring the application.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The order store could not be opened or migrated.
    #[error("persistence: {0}")]
    Persistence(#[from] RepositoryError),

    /// A venue adapter could not be constructed.
    #[error("venue {venue}: {source}")]
    Venue {
        /// Configured venue name.
        venue: String,
        /// Construction error.
        source: AdapterError,
    },
}

/// Every persistence port, backed by one store.
struct Stores {
    orders: Arc<dyn OrderRepository>,
    audit: Arc<dyn AuditSink>,
    profiles: Arc<dyn RiskProfileRepository>,
    subscriptions: Arc<dyn CopySubscriptionRepository>,
    reports: Arc<dyn ReconciliationReportRepository>,
    queue: Arc<dyn SubmissionQueue>,
}

impl Stores {
    fn in_memory(config: &Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            orders: store.clone(),
            audit: store.clone(),
            profiles: store.clone(),
            subscriptions: store.clone(),
            reports: store,
            queue: Arc::new(InMemoryQueue::new(config.queue.visibility_timeout())),
        }
    }

    async fn postgres(config: &Config, database_url: &str) -> Result<Self, RepositoryError> {
        let pool = connect_pool(database_url, config.persistence.max_connections).await?;
        let store = Arc::new(PostgresStore::new(pool.clone()));
        store.migrate().await?;
        Ok(Self {
            orders: store.clone(),
            audit: store.clone(),
            profiles: store.clone(),
            subscriptions: store.clone(),
            reports: store,
            queue: Arc::new(PostgresQueue::new(
                pool,
                config.queue.poll_interval(),
                config.queue.visibility_timeout(),
            )),
        })
    }
}

/// Dependency injection container.
///
/// Holds the wired services. The execution-report receiver is handed out once
/// to whoever runs the fill listener.
pub struct Container {
    registry: Arc<AdapterRegistry>,
    market: MarketFacade,
    risk: Arc<RiskGate>,
    reconciler: Arc<Reconciler>,
    orchestrator: Arc<OrderOrchestrator>,
    orders: Arc<dyn OrderRepository>,
    audit: Arc<dyn AuditSink>,
    reports_tx: ExecutionReportSender,
    reports_rx: Mutex<Option<mpsc::UnboundedReceiver<ExecutionReport>>>,
    cancel: CancellationToken,
}

impl Container {
    /// Build the application with the venues enabled in `config`.
    pub async fn new(config: &Config) -> Result<Self, ContainerError> {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let adapters = build_adapters(&config.venues, &reports_tx)?;
        Self::assemble(config, adapters, reports_tx, reports_rx).await
    }

    /// Build the application around caller-supplied adapters.
    ///
    /// Venue configuration is ignored. Asynchronous reports can be injected
    /// through [`Container::execution_reports`].
    pub async fn with_adapters(
        config: &Config,
        adapters: Vec<Arc<dyn ExchangeAdapter>>,
    ) -> Result<Self, ContainerError> {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self::assemble(config, adapters, reports_tx, reports_rx).await
    }

    async fn assemble(
        config: &Config,
        adapters: Vec<Arc<dyn ExchangeAdapter>>,
        reports_tx: ExecutionReportSender,
        reports_rx: mpsc::UnboundedReceiver<ExecutionReport>,
    ) -> Result<Self, ContainerError> {
        let stores = match (&config.persistence.backend, &config.persistence.database_url) {
            (PersistenceBackend::Postgres, Some(url)) => {
                info!("Using PostgreSQL persistence");
                Stores::postgres(config, url).await?
            }
            (PersistenceBackend::Postgres, None) => {
                return Err(RepositoryError::Storage(
                    "persistence.database_url is not set".to_string(),
                )
                .into());
            }
            (PersistenceBackend::Memory, _) => {
                warn!("Using in-memory persistence; orders are lost on restart");
                Stores::in_memory(config)
            }
        };

        let registry = Arc::new(AdapterRegistry::new(adapters));
        let market = MarketFacade::new(Arc::clone(&registry));
        let router = SmartOrderRouter::new(Arc::clone(&registry));

        let alerts: Arc<dyn AlertSink> = match AlertDispatcher::new(&config.alerting) {
            Ok(dispatcher) => Arc::new(dispatcher),
            Err(e) => {
                warn!(error = %e, "Alert channels unavailable, logging alerts only");
                Arc::new(AlertDispatcher::log_only())
            }
        };
        let telemetry: Arc<dyn TelemetrySink> = Arc::new(MetricsTelemetry);

        let risk = Arc::new(RiskGate::new(
            Arc::clone(&stores.profiles),
            market.clone(),
            router.clone(),
            Arc::clone(&stores.audit),
        ));
        let copy_trader = Arc::new(CopyTrader::new(
            Arc::clone(&stores.subscriptions),
            Arc::clone(&stores.audit),
            config.copy_trading.enabled,
            config.copy_trading.max_depth,
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&stores.orders),
            market.clone(),
            Arc::clone(&stores.reports),
            Arc::clone(&stores.audit),
            Arc::clone(&alerts),
            Arc::clone(&telemetry),
        ));

        let cancel = CancellationToken::new();
        let orchestrator = OrderOrchestrator::new(
            OrchestratorDeps {
                orders: Arc::clone(&stores.orders),
                queue: Arc::clone(&stores.queue),
                risk: Arc::clone(&risk),
                market: market.clone(),
                router,
                copy_trader,
                alerts,
                telemetry,
            },
            config.orchestrator.settings(config.queue.poll_interval()),
            cancel.clone(),
        );

        info!(
            venues = ?registry.configured_venues(),
            live = config.environment.is_live(),
            "Container initialized"
        );

        Ok(Self {
            registry,
            market,
            risk,
            reconciler,
            orchestrator,
            orders: stores.orders,
            audit: stores.audit,
            reports_tx,
            reports_rx: Mutex::new(Some(reports_rx)),
            cancel,
        })
    }

    /// Venue adapter registry.
    pub fn registry(&self) -> Arc<AdapterRegistry> {
        Arc::clone(&self.registry)
    }

    /// Venue-agnostic market access.
    pub const fn market(&self) -> &MarketFacade {
        &self.market
    }

    /// Pre-trade risk gate and profile management.
    pub fn risk(&self) -> Arc<RiskGate> {
        Arc::clone(&self.risk)
    }

    /// Trade reconciler.
    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::clone(&self.reconciler)
    }

    /// The order orchestrator.
    pub fn orchestrator(&self) -> Arc<OrderOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Order store.
    pub fn orders(&self) -> Arc<dyn OrderRepository> {
        Arc::clone(&self.orders)
    }

    /// Audit log.
    pub fn audit(&self) -> Arc<dyn AuditSink> {
        Arc::clone(&self.audit)
    }

    /// Sender feeding the fill listener.
    pub fn execution_reports(&self) -> ExecutionReportSender {
        self.reports_tx.clone()
    }

    /// Take the execution-report receiver. `None` after the first call.
    pub async fn take_execution_reports(
        &self,
    ) -> Option<mpsc::UnboundedReceiver<ExecutionReport>> {
        self.reports_rx.lock().await.take()
    }

    /// Root token cancelling every background task.
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Construct an adapter for every enabled venue, in SOR tie-break order:
/// CFD, spot, FIX.
fn build_adapters(
    venues: &VenuesConfig,
    reports: &ExecutionReportSender,
) -> Result<Vec<Arc<dyn ExchangeAdapter>>, ContainerError> {
    let mut adapters: Vec<Arc<dyn ExchangeAdapter>> = Vec::new();

    if venues.cfd.enabled {
        let adapter = CfdAdapter::new(venues.cfd.clone()).map_err(|source| ContainerError::Venue {
            venue: venues.cfd.name.clone(),
            source,
        })?;
        adapters.push(Arc::new(adapter));
    }
    if venues.spot.enabled {
        let adapter =
            SpotAdapter::new(venues.spot.clone()).map_err(|source| ContainerError::Venue {
                venue: venues.spot.name.clone(),
                source,
            })?;
        adapters.push(Arc::new(adapter));
    }
    if venues.fix.enabled {
        adapters.push(Arc::new(FixAdapter::new(venues.fix.clone(), reports.clone())));
    }

    Ok(adapters)
}
