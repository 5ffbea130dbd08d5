//! Shared fixtures for the integration tests: a scriptable venue adapter,
//! recording alert and telemetry sinks, and a fully wired orchestrator on the
//! in-memory store.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use order_orchestrator::application::orchestrator::{
    OrchestratorDeps, OrchestratorSettings, OrderOrchestrator,
};
use order_orchestrator::application::ports::{
    AccountBalance, AdapterError, AlertLevel, AlertSink, CancelResult, ConnectionStatus,
    ExchangeAdapter, Kline, PlaceOrderRequest, PlaceOrderResult, Position, SymbolInfo,
    TelemetrySink, Tick, Timeframe, Trade, VenueOrderPhase, VenueOrderState,
};
use order_orchestrator::application::services::{
    AdapterRegistry, CopyTrader, MarketFacade, Reconciler, RiskGate, SmartOrderRouter,
};
use order_orchestrator::domain::order_execution::{Order, OrderSide, OrderStatus};
use order_orchestrator::domain::shared::{OrderId, VenueName};
use order_orchestrator::infrastructure::persistence::{InMemoryQueue, InMemoryStore};
use order_orchestrator::resilience::RetryConfig;

// ============================================
// Mock venue
// ============================================

/// What the mock venue answers to `place_order`.
#[derive(Debug, Clone)]
pub enum PlaceBehavior {
    /// Accept and fill the whole quantity at `price`.
    Fill(Decimal),
    /// Accept without a fill; fills come later as execution reports.
    Accept,
    /// Answer `success = false` with a message.
    Unsuccessful(String),
    /// Fail the call.
    Error(AdapterError),
    /// Never answer.
    Hang,
}

/// Scriptable in-process venue.
pub struct MockAdapter {
    venue: VenueName,
    status: Mutex<ConnectionStatus>,
    ticks: Mutex<HashMap<String, Tick>>,
    behavior: Mutex<PlaceBehavior>,
    positions: Mutex<Vec<Position>>,
    trades: Mutex<Vec<Trade>>,
    fail_connect: Mutex<bool>,
    symbol_catalog: bool,
    order_states: Mutex<HashMap<String, VenueOrderState>>,
    pub state_calls: AtomicUsize,
    pub tick_calls: AtomicUsize,
    pub place_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    placed: Mutex<Vec<PlaceOrderRequest>>,
}

impl MockAdapter {
    pub fn new(venue: &str) -> Arc<Self> {
        Arc::new(Self::build(venue, true))
    }

    /// A venue that publishes no instrument list, like a FIX session.
    pub fn without_symbol_catalog(venue: &str) -> Arc<Self> {
        Arc::new(Self::build(venue, false))
    }

    fn build(venue: &str, symbol_catalog: bool) -> Self {
        Self {
            venue: VenueName::new(venue),
            status: Mutex::new(ConnectionStatus::Disconnected),
            ticks: Mutex::new(HashMap::new()),
            behavior: Mutex::new(PlaceBehavior::Accept),
            positions: Mutex::new(Vec::new()),
            trades: Mutex::new(Vec::new()),
            fail_connect: Mutex::new(false),
            symbol_catalog,
            order_states: Mutex::new(HashMap::new()),
            state_calls: AtomicUsize::new(0),
            tick_calls: AtomicUsize::new(0),
            place_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            placed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_quote(self: Arc<Self>, symbol: &str, bid: Decimal, ask: Decimal) -> Arc<Self> {
        self.set_quote(symbol, bid, ask);
        self
    }

    pub fn with_behavior(self: Arc<Self>, behavior: PlaceBehavior) -> Arc<Self> {
        *self.behavior.lock().unwrap() = behavior;
        self
    }

    pub fn set_quote(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        self.ticks.lock().unwrap().insert(
            symbol.to_string(),
            Tick {
                symbol: symbol.to_string(),
                bid,
                ask,
                last: (bid + ask) / Decimal::TWO,
                time: Utc::now(),
            },
        );
    }

    pub fn set_positions(&self, positions: Vec<Position>) {
        *self.positions.lock().unwrap() = positions;
    }

    pub fn set_trades(&self, trades: Vec<Trade>) {
        *self.trades.lock().unwrap() = trades;
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        *self.fail_connect.lock().unwrap() = fail;
    }

    /// Script what a status query for `exchange_order_id` answers.
    pub fn set_order_state(
        &self,
        exchange_order_id: &str,
        phase: VenueOrderPhase,
        filled_quantity: Decimal,
        average_price: Option<Decimal>,
    ) {
        self.order_states.lock().unwrap().insert(
            exchange_order_id.to_string(),
            VenueOrderState {
                exchange_order_id: exchange_order_id.to_string(),
                phase,
                filled_quantity,
                average_price,
                reason: None,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn state_count(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }

    pub fn placed(&self) -> Vec<PlaceOrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    pub fn tick_count(&self) -> usize {
        self.tick_calls.load(Ordering::SeqCst)
    }

    pub fn place_count(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeAdapter for MockAdapter {
    fn venue(&self) -> &VenueName {
        &self.venue
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_connect.lock().unwrap() {
            self.set_status(ConnectionStatus::Error);
            return Err(AdapterError::Connection("refused".to_string()));
        }
        self.set_status(ConnectionStatus::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        self.set_status(ConnectionStatus::Disconnected);
        Ok(())
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    fn has_symbol_catalog(&self) -> bool {
        self.symbol_catalog
    }

    async fn get_all_symbols(&self) -> Result<Vec<SymbolInfo>, AdapterError> {
        Ok(Vec::new())
    }

    async fn get_symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>, AdapterError> {
        // Symbols with a quote are tradeable.
        if !self.symbol_catalog || !self.ticks.lock().unwrap().contains_key(symbol) {
            return Ok(None);
        }
        Ok(Some(SymbolInfo {
            symbol: symbol.to_string(),
            description: symbol.to_string(),
            base_currency: String::new(),
            quote_currency: String::new(),
            volume_min: Decimal::ZERO,
            volume_max: Decimal::MAX,
            volume_step: Decimal::ZERO,
            contract_size: Decimal::ONE,
        }))
    }

    async fn get_latest_tick(&self, symbol: &str) -> Result<Option<Tick>, AdapterError> {
        self.tick_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ticks.lock().unwrap().get(symbol).cloned())
    }

    async fn get_historical_klines(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Kline>, AdapterError> {
        Ok(Vec::new())
    }

    async fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> Result<PlaceOrderResult, AdapterError> {
        let n = self.place_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.placed.lock().unwrap().push(request.clone());
        let behavior = self.behavior.lock().unwrap().clone();
        let exchange_order_id = format!("{}-{n}", self.venue.as_str().to_uppercase());
        match behavior {
            PlaceBehavior::Fill(price) => Ok(PlaceOrderResult {
                success: true,
                retcode: 0,
                exchange_order_id: Some(exchange_order_id),
                deal_id: Some(format!("D{n}")),
                filled_quantity: request.quantity,
                fill_price: Some(price),
                message: "FILLED".to_string(),
            }),
            PlaceBehavior::Accept => Ok(PlaceOrderResult {
                success: true,
                retcode: 0,
                exchange_order_id: Some(exchange_order_id),
                deal_id: None,
                filled_quantity: Decimal::ZERO,
                fill_price: None,
                message: "NEW".to_string(),
            }),
            PlaceBehavior::Unsuccessful(message) => Ok(PlaceOrderResult {
                success: false,
                retcode: 10_019,
                exchange_order_id: None,
                deal_id: None,
                filled_quantity: Decimal::ZERO,
                fill_price: None,
                message,
            }),
            PlaceBehavior::Error(e) => Err(e),
            PlaceBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn cancel_order(
        &self,
        exchange_order_id: &str,
        _symbol: &str,
    ) -> Result<CancelResult, AdapterError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CancelResult {
            exchange_order_id: exchange_order_id.to_string(),
            status: "CANCELED".to_string(),
        })
    }

    async fn get_order_state(
        &self,
        exchange_order_id: &str,
        _symbol: &str,
    ) -> Result<Option<VenueOrderState>, AdapterError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.order_states.lock().unwrap().get(exchange_order_id).cloned())
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>, AdapterError> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn get_trade_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, AdapterError> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.time >= start && t.time <= end)
            .cloned()
            .collect())
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, AdapterError> {
        Ok(AccountBalance {
            currency: "USD".to_string(),
            balance: Decimal::ZERO,
            equity: Decimal::ZERO,
            free_margin: None,
            assets: Vec::new(),
        })
    }
}

pub fn position(symbol: &str, volume: Decimal, price: Decimal) -> Position {
    Position {
        ticket: format!("P-{symbol}"),
        symbol: symbol.to_string(),
        side: OrderSide::Buy,
        volume,
        price_open: price,
        price_current: price,
        profit: Decimal::ZERO,
        opened_at: None,
    }
}

pub fn trade(exchange_order_id: &str, symbol: &str, volume: Decimal, price: Decimal) -> Trade {
    Trade {
        ticket: format!("T-{exchange_order_id}"),
        exchange_order_id: exchange_order_id.to_string(),
        symbol: symbol.to_string(),
        side: OrderSide::Buy,
        volume,
        price,
        profit: Decimal::ZERO,
        time: Utc::now(),
    }
}

// ============================================
// Recording sinks
// ============================================

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<(String, AlertLevel)>>,
}

impl RecordingAlerts {
    pub fn all(&self) -> Vec<(String, AlertLevel)> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn count(&self, level: AlertLevel) -> usize {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, l)| *l == level)
            .count()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn dispatch(&self, message: &str, level: AlertLevel) {
        self.alerts.lock().unwrap().push((message.to_string(), level));
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    latencies: Mutex<Vec<VenueName>>,
    fills: Mutex<Vec<(VenueName, String, Decimal, Decimal)>>,
    reconciliations: Mutex<Vec<(VenueName, String)>>,
}

impl RecordingTelemetry {
    pub fn latency_count(&self) -> usize {
        self.latencies.lock().unwrap().len()
    }

    pub fn fills(&self) -> Vec<(VenueName, String, Decimal, Decimal)> {
        self.fills.lock().unwrap().clone()
    }

    pub fn reconciliations(&self) -> Vec<(VenueName, String)> {
        self.reconciliations.lock().unwrap().clone()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record_order_latency(&self, venue: &VenueName, _latency_ms: f64) {
        self.latencies.lock().unwrap().push(venue.clone());
    }

    fn record_fill(
        &self,
        venue: &VenueName,
        symbol: &str,
        _side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) {
        self.fills
            .lock()
            .unwrap()
            .push((venue.clone(), symbol.to_string(), quantity, price));
    }

    fn record_reconciliation(&self, venue: &VenueName, status: &str) {
        self.reconciliations
            .lock()
            .unwrap()
            .push((venue.clone(), status.to_string()));
    }
}

// ============================================
// Wired orchestrator
// ============================================

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub queue: Arc<InMemoryQueue>,
    pub registry: Arc<AdapterRegistry>,
    pub market: MarketFacade,
    pub router: SmartOrderRouter,
    pub risk: Arc<RiskGate>,
    pub reconciler: Arc<Reconciler>,
    pub alerts: Arc<RecordingAlerts>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub orchestrator: Arc<OrderOrchestrator>,
    pub cancel: CancellationToken,
}

pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        place_order_timeout: Duration::from_millis(500),
        paper_submit_delay: Duration::from_millis(20),
        paper_fill_delay: Duration::from_millis(20),
        report_retry: RetryConfig::fixed(3, Duration::from_millis(20)),
        shutdown_grace: Duration::from_secs(1),
        queue_error_backoff: Duration::from_millis(20),
    }
}

impl Harness {
    /// Wire and connect `adapters`. Copy trading is enabled with depth 1.
    pub async fn new(adapters: Vec<Arc<MockAdapter>>) -> Self {
        Self::build(adapters, true, fast_settings()).await
    }

    pub async fn build(
        adapters: Vec<Arc<MockAdapter>>,
        copy_trading: bool,
        settings: OrchestratorSettings,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
        let registry = Arc::new(AdapterRegistry::new(
            adapters
                .into_iter()
                .map(|a| a as Arc<dyn ExchangeAdapter>)
                .collect(),
        ));
        registry.startup_all().await;

        let market = MarketFacade::new(Arc::clone(&registry));
        let router = SmartOrderRouter::new(Arc::clone(&registry));
        let alerts = Arc::new(RecordingAlerts::default());
        let telemetry = Arc::new(RecordingTelemetry::default());

        let risk = Arc::new(RiskGate::new(
            store.clone(),
            market.clone(),
            router.clone(),
            store.clone(),
        ));
        let copy_trader = Arc::new(CopyTrader::new(store.clone(), store.clone(), copy_trading, 1));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            market.clone(),
            store.clone(),
            store.clone(),
            alerts.clone(),
            telemetry.clone(),
        ));

        let cancel = CancellationToken::new();
        let orchestrator = OrderOrchestrator::new(
            OrchestratorDeps {
                orders: store.clone(),
                queue: queue.clone(),
                risk: Arc::clone(&risk),
                market: market.clone(),
                router: router.clone(),
                copy_trader,
                alerts: alerts.clone(),
                telemetry: telemetry.clone(),
            },
            settings,
            cancel.clone(),
        );

        Self {
            store,
            queue,
            registry,
            market,
            router,
            risk,
            reconciler,
            alerts,
            telemetry,
            orchestrator,
            cancel,
        }
    }

    /// Start the submission worker in the background.
    pub fn start_worker(&self) {
        tokio::spawn(Arc::clone(&self.orchestrator).run_worker());
    }

    /// Poll the store until `order_id` reaches `status`.
    pub async fn wait_for_status(&self, order_id: &OrderId, status: OrderStatus) -> Order {
        let poll = async {
            loop {
                let order = self.orchestrator.get_order(order_id).await.unwrap();
                if order.status() == status {
                    return order;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        match tokio::time::timeout(Duration::from_secs(5), poll).await {
            Ok(order) => order,
            Err(_) => {
                let current = self.orchestrator.get_order(order_id).await.unwrap();
                panic!(
                    "order {order_id} never reached {status}, stuck at {}",
                    current.status()
                );
            }
        }
    }

    /// Audit entries about `order_id` with the given action.
    pub async fn audits_for(
        &self,
        order_id: &OrderId,
        action: order_orchestrator::domain::audit::AuditAction,
    ) -> Vec<order_orchestrator::domain::audit::AuditEntry> {
        self.store
            .audit_entries()
            .await
            .into_iter()
            .filter(|e| e.action == action && e.order_id() == Some(order_id.as_str()))
            .collect()
    }

    pub async fn shutdown(&self) {
        self.orchestrator.shutdown().await;
    }
}
