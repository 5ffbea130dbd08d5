//! FIX order-routing adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::codec::{FixMessage, format_timestamp, msg_type, tag};
use super::listener::{ListenerContext, read_message, run_listener};
use super::session::{FixSession, run_heartbeat};
use crate::application::ports::{
    AccountBalance, AdapterError, CancelResult, ConnectionStatus, ExchangeAdapter,
    ExecutionReportSender, Kline, PlaceOrderRequest, PlaceOrderResult, Position, SymbolInfo, Tick,
    Timeframe, Trade, VenueOrderState,
};
use crate::config::FixVenueConfig;
use crate::domain::order_execution::{OrderSide, OrderType};
use crate::domain::shared::{OrderId, VenueName};
use crate::infrastructure::venues::status::StatusCell;

const fn fix_side(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "1",
        OrderSide::Sell => "2",
    }
}

const fn fix_ord_type(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "1",
        OrderType::Limit => "2",
    }
}

fn io_error(e: &std::io::Error) -> AdapterError {
    AdapterError::Connection(e.to_string())
}

struct ActiveSession {
    session: Arc<FixSession>,
    cancel: CancellationToken,
}

/// Side and size of an order sent on this session; OrderCancelRequest must
/// repeat them.
#[derive(Debug, Clone, Copy)]
struct Ticket {
    side: OrderSide,
    quantity: Decimal,
}

/// FIX 4.2 order-routing adapter.
///
/// Orders are acknowledged asynchronously: `place_order` returns once the
/// NewOrderSingle is on the wire, with the ClOrdID as the venue handle, and
/// executions arrive on the execution report channel. The session carries no
/// market data or account queries, so those reads return empty results.
pub struct FixAdapter {
    venue: VenueName,
    config: FixVenueConfig,
    status: Arc<StatusCell>,
    reports: ExecutionReportSender,
    active: Mutex<Option<ActiveSession>>,
    tickets: Mutex<HashMap<String, Ticket>>,
}

impl std::fmt::Debug for FixAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixAdapter")
            .field("venue", &self.venue)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}

impl FixAdapter {
    /// Create an adapter that pushes execution reports into `reports`.
    pub fn new(config: FixVenueConfig, reports: ExecutionReportSender) -> Self {
        Self {
            venue: VenueName::new(&config.name),
            config,
            status: Arc::new(StatusCell::new()),
            reports,
            active: Mutex::new(None),
            tickets: Mutex::new(HashMap::new()),
        }
    }

    async fn session(&self) -> Result<Arc<FixSession>, AdapterError> {
        match self.active.lock().await.as_ref() {
            Some(active) if self.status.get().is_connected() => Ok(Arc::clone(&active.session)),
            _ => Err(AdapterError::NotConnected(self.venue.to_string())),
        }
    }

    fn require_session(&self) -> Result<(), AdapterError> {
        if self.status.get().is_connected() {
            Ok(())
        } else {
            Err(AdapterError::NotConnected(self.venue.to_string()))
        }
    }

    async fn send(&self, session: &FixSession, msg: &FixMessage) -> Result<u64, AdapterError> {
        session.send(msg).await.map_err(|e| {
            warn!(venue = %self.venue, error = %e, "Session write failed");
            self.status.set(ConnectionStatus::Error);
            io_error(&e)
        })
    }

    /// Log on over an established byte stream and start the session tasks.
    async fn establish<S>(&self, stream: S) -> Result<(), AdapterError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let session = Arc::new(FixSession::new(
            &self.config.sender_comp_id,
            &self.config.target_comp_id,
            writer,
        ));

        let mut logon = FixMessage::new(msg_type::LOGON)
            .with(tag::ENCRYPT_METHOD, 0)
            .with(tag::HEART_BT_INT, self.config.heartbeat_interval_secs)
            .with(tag::RESET_SEQ_NUM_FLAG, "Y");
        if let Some(username) = &self.config.username {
            logon.push(tag::USERNAME, username);
        }
        if let Some(password) = &self.config.password {
            logon.push(tag::PASSWORD, password);
        }
        session.send(&logon).await.map_err(|e| io_error(&e))?;

        let mut buf = Vec::new();
        let ack = tokio::time::timeout(
            self.config.connect_timeout(),
            read_message(&mut reader, &mut buf),
        )
        .await
        .map_err(|_| AdapterError::Timeout(self.config.connect_timeout()))??;

        match ack.msg_type() {
            msg_type::LOGON => {}
            msg_type::LOGOUT => {
                return Err(AdapterError::Authentication(
                    ack.get(tag::TEXT).unwrap_or("Logon refused").to_string(),
                ));
            }
            other => {
                return Err(AdapterError::Protocol(format!(
                    "Expected Logon, got MsgType {other}"
                )));
            }
        }

        let cancel = CancellationToken::new();
        self.status.set(ConnectionStatus::Connected);

        tokio::spawn(run_listener(
            reader,
            buf,
            ListenerContext {
                venue: self.venue.clone(),
                session: Arc::clone(&session),
                status: Arc::clone(&self.status),
                reports: self.reports.clone(),
                cancel: cancel.clone(),
            },
        ));
        tokio::spawn(run_heartbeat(
            self.venue.clone(),
            Arc::clone(&session),
            self.config.heartbeat_interval(),
            Arc::clone(&self.status),
            cancel.clone(),
        ));

        *self.active.lock().await = Some(ActiveSession { session, cancel });
        Ok(())
    }

    async fn open(&self) -> Result<(), AdapterError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let stream = tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| AdapterError::Timeout(self.config.connect_timeout()))?
            .map_err(|e| io_error(&e))?;
        stream.set_nodelay(true).map_err(|e| io_error(&e))?;
        self.establish(stream).await
    }
}

#[async_trait]
impl ExchangeAdapter for FixAdapter {
    fn venue(&self) -> &VenueName {
        &self.venue
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        if self.status.get().is_connected() {
            return Ok(());
        }
        let c = &self.config;
        if c.host.is_empty() || c.sender_comp_id.is_empty() || c.target_comp_id.is_empty() {
            self.status.set(ConnectionStatus::Error);
            return Err(AdapterError::Connection(format!(
                "{}: host/sender_comp_id/target_comp_id not configured",
                self.venue
            )));
        }

        // Tasks of a lost session must not outlive it.
        if let Some(stale) = self.active.lock().await.take() {
            stale.cancel.cancel();
        }
        self.status.set(ConnectionStatus::Connecting);

        match self.open().await {
            Ok(()) => {
                info!(venue = %self.venue, host = %c.host, port = c.port, "FIX session established");
                Ok(())
            }
            Err(e) => {
                self.status.set(ConnectionStatus::Error);
                Err(AdapterError::Connection(format!(
                    "{} connection failed: {e}",
                    self.venue
                )))
            }
        }
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        let active = self.active.lock().await.take();
        if let Some(active) = active {
            active.cancel.cancel();
            if let Err(e) = active
                .session
                .send(&FixMessage::new(msg_type::LOGOUT))
                .await
            {
                warn!(venue = %self.venue, error = %e, "Logout not delivered");
            }
        }
        self.status.set(ConnectionStatus::Disconnected);
        Ok(())
    }

    fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    fn has_symbol_catalog(&self) -> bool {
        false
    }

    async fn get_all_symbols(&self) -> Result<Vec<SymbolInfo>, AdapterError> {
        self.require_session()?;
        Ok(Vec::new())
    }

    async fn get_symbol_info(&self, _symbol: &str) -> Result<Option<SymbolInfo>, AdapterError> {
        self.require_session()?;
        Ok(None)
    }

    async fn get_latest_tick(&self, _symbol: &str) -> Result<Option<Tick>, AdapterError> {
        self.require_session()?;
        Ok(None)
    }

    async fn get_historical_klines(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Kline>, AdapterError> {
        self.require_session()?;
        Ok(Vec::new())
    }

    async fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> Result<PlaceOrderResult, AdapterError> {
        let session = self.session().await?;
        let cl_ord_id = request.client_order_id.to_string();

        let mut msg = FixMessage::new(msg_type::NEW_ORDER_SINGLE)
            .with(tag::CL_ORD_ID, &cl_ord_id)
            .with(tag::HANDL_INST, "1")
            .with(tag::SYMBOL, &request.symbol)
            .with(tag::SIDE, fix_side(request.side))
            .with(tag::TRANSACT_TIME, format_timestamp(Utc::now()))
            .with(tag::ORDER_QTY, request.quantity.normalize())
            .with(tag::ORD_TYPE, fix_ord_type(request.order_type));
        if request.order_type == OrderType::Limit {
            let price = request.price.ok_or_else(|| {
                AdapterError::Validation("LIMIT order requires a price".to_string())
            })?;
            msg.push(tag::PRICE, price.normalize());
        }
        msg.push(tag::TIME_IN_FORCE, "0");
        if !request.comment.is_empty() {
            msg.push(tag::TEXT, &request.comment);
        }

        let seq = self.send(&session, &msg).await?;
        self.tickets.lock().await.insert(
            cl_ord_id.clone(),
            Ticket {
                side: request.side,
                quantity: request.quantity,
            },
        );
        info!(venue = %self.venue, cl_ord_id = %cl_ord_id, seq, "NewOrderSingle sent");

        Ok(PlaceOrderResult {
            success: true,
            retcode: 0,
            exchange_order_id: Some(cl_ord_id.clone()),
            deal_id: None,
            filled_quantity: Decimal::ZERO,
            fill_price: None,
            message: format!("Submitted with ClOrdID {cl_ord_id}, awaiting execution report"),
        })
    }

    async fn cancel_order(
        &self,
        exchange_order_id: &str,
        symbol: &str,
    ) -> Result<CancelResult, AdapterError> {
        let session = self.session().await?;
        let ticket = self
            .tickets
            .lock()
            .await
            .get(exchange_order_id)
            .copied()
            .ok_or_else(|| {
                AdapterError::Rejected(format!(
                    "Order {exchange_order_id} was not sent on the current session"
                ))
            })?;

        let msg = FixMessage::new(msg_type::ORDER_CANCEL_REQUEST)
            .with(tag::ORIG_CL_ORD_ID, exchange_order_id)
            .with(tag::CL_ORD_ID, OrderId::generate())
            .with(tag::SYMBOL, symbol)
            .with(tag::SIDE, fix_side(ticket.side))
            .with(tag::TRANSACT_TIME, format_timestamp(Utc::now()))
            .with(tag::ORDER_QTY, ticket.quantity.normalize());
        self.send(&session, &msg).await?;

        Ok(CancelResult {
            exchange_order_id: exchange_order_id.to_string(),
            status: "PENDING_CANCEL".to_string(),
        })
    }

    fn pushes_execution_reports(&self) -> bool {
        true
    }

    async fn get_order_state(
        &self,
        _exchange_order_id: &str,
        _symbol: &str,
    ) -> Result<Option<VenueOrderState>, AdapterError> {
        self.require_session()?;
        Ok(None)
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>, AdapterError> {
        self.require_session()?;
        Ok(Vec::new())
    }

    async fn get_trade_history(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, AdapterError> {
        self.require_session()?;
        Ok(Vec::new())
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, AdapterError> {
        self.require_session()?;
        Err(AdapterError::NotFound(format!(
            "{} does not report account balances",
            self.venue
        )))
    }
}
