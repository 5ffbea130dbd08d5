//! CFD adapter implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::api_types::{
    AccountRecord, DealRecord, LoginRequest, LoginResponse, OrderRecord, OrderSendRequest,
    PositionRecord, RateRecord, SessionState, SymbolRecord, TickRecord, TradeResult, is_success,
};
use crate::application::ports::{
    AccountBalance, AdapterError, CancelResult, ConnectionStatus, ExchangeAdapter, Kline,
    PlaceOrderRequest, PlaceOrderResult, Position, SymbolInfo, Tick, Timeframe, Trade,
    VenueOrderPhase, VenueOrderState,
};
use crate::config::CfdVenueConfig;
use crate::domain::order_execution::{OrderSide, OrderType};
use crate::domain::shared::VenueName;
use crate::infrastructure::venues::http::{HttpError, HttpExecutor};
use crate::infrastructure::venues::status::StatusCell;

/// Terminal timeframe constant for a platform timeframe.
const fn terminal_timeframe(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::M1 => "M1",
        Timeframe::M5 => "M5",
        Timeframe::M15 => "M15",
        Timeframe::M30 => "M30",
        Timeframe::H1 => "H1",
        Timeframe::H4 => "H4",
        Timeframe::D1 => "D1",
        Timeframe::W1 => "W1",
        Timeframe::MN1 => "MN1",
    }
}

const fn terminal_order_type(side: OrderSide, order_type: OrderType) -> &'static str {
    match (side, order_type) {
        (OrderSide::Buy, OrderType::Market) => "ORDER_TYPE_BUY",
        (OrderSide::Sell, OrderType::Market) => "ORDER_TYPE_SELL",
        (OrderSide::Buy, OrderType::Limit) => "ORDER_TYPE_BUY_LIMIT",
        (OrderSide::Sell, OrderType::Limit) => "ORDER_TYPE_SELL_LIMIT",
    }
}

fn order_phase(state: &str) -> VenueOrderPhase {
    match state {
        "ORDER_STATE_FILLED" => VenueOrderPhase::Done,
        "ORDER_STATE_CANCELED" => VenueOrderPhase::Canceled,
        "ORDER_STATE_REJECTED" => VenueOrderPhase::Rejected,
        "ORDER_STATE_EXPIRED" => VenueOrderPhase::Expired,
        _ => VenueOrderPhase::Working,
    }
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>, AdapterError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AdapterError::Protocol(format!("Invalid timestamp: {secs}")))
}

/// CFD broker adapter.
#[derive(Debug)]
pub struct CfdAdapter {
    venue: VenueName,
    config: CfdVenueConfig,
    http: HttpExecutor,
    status: StatusCell,
    token: RwLock<Option<String>>,
}

impl CfdAdapter {
    /// Create an adapter. Does not touch the network.
    pub fn new(config: CfdVenueConfig) -> Result<Self, AdapterError> {
        let http = HttpExecutor::new(config.timeout(), config.retry.clone())?;
        Ok(Self {
            venue: VenueName::new(&config.name),
            config,
            http,
            status: StatusCell::new(),
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.gateway_url.trim_end_matches('/'))
    }

    async fn token(&self) -> Result<String, AdapterError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| AdapterError::NotConnected(self.venue.to_string()))
    }

    /// A 401 means the gateway dropped our session.
    fn session_checked<T>(&self, result: Result<T, HttpError>) -> Result<T, AdapterError> {
        match result {
            Err(HttpError::Status {
                status: StatusCode::UNAUTHORIZED,
                body,
            }) => {
                warn!(venue = %self.venue, "Gateway session expired");
                self.status.set(ConnectionStatus::Error);
                Err(AdapterError::Connection(format!("Session expired: {body}")))
            }
            other => other.map_err(Into::into),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AdapterError> {
        let token = self.token().await?;
        let url = self.url(path);
        let result = self
            .http
            .read(|c| c.get(&url).bearer_auth(&token).query(query))
            .await;
        self.session_checked(result)
    }

    /// GET that maps 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, AdapterError> {
        match self.get(path, &[]).await {
            Ok(v) => Ok(Some(v)),
            Err(AdapterError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn login(&self) -> Result<String, AdapterError> {
        let c = &self.config;
        if c.login.is_empty() || c.password.is_empty() || c.server.is_empty() {
            return Err(AdapterError::Authentication(
                "login/password/server not configured".to_string(),
            ));
        }
        let body = LoginRequest {
            login: &c.login,
            password: &c.password,
            server: &c.server,
        };
        let request = self.http.client().post(self.url("/session")).json(&body);
        let resp: LoginResponse = self.http.write(request).await?;
        Ok(resp.token)
    }
}

#[async_trait]
impl ExchangeAdapter for CfdAdapter {
    fn venue(&self) -> &VenueName {
        &self.venue
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        if self.status.get().is_connected() {
            return Ok(());
        }
        self.status.set(ConnectionStatus::Connecting);

        match self.login().await {
            Ok(token) => {
                *self.token.write().await = Some(token);
                self.status.set(ConnectionStatus::Connected);
                info!(venue = %self.venue, server = %self.config.server, "CFD venue connected");
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
        let token = self.token.write().await.take();
        if let Some(token) = token {
            let request = self
                .http
                .client()
                .delete(self.url("/session"))
                .bearer_auth(token);
            if let Err(e) = self.http.write::<serde_json::Value>(request).await {
                warn!(venue = %self.venue, error = %e, "Gateway logout failed");
            }
        }
        self.status.set(ConnectionStatus::Disconnected);
        Ok(())
    }

    fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    async fn check_liveness(&self) -> ConnectionStatus {
        if self.status.get() != ConnectionStatus::Connected {
            return self.status.get();
        }
        match self.get::<SessionState>("/session", &[]).await {
            Ok(state) if state.connected => ConnectionStatus::Connected,
            Ok(_) => {
                warn!(venue = %self.venue, "Terminal reports no broker connection");
                self.status.set(ConnectionStatus::Error);
                ConnectionStatus::Error
            }
            Err(e) => {
                warn!(venue = %self.venue, error = %e, "Gateway probe failed");
                self.status.set(ConnectionStatus::Error);
                ConnectionStatus::Error
            }
        }
    }

    async fn get_all_symbols(&self) -> Result<Vec<SymbolInfo>, AdapterError> {
        let records: Vec<SymbolRecord> = self.get("/symbols", &[]).await?;
        Ok(records.into_iter().map(SymbolInfo::from).collect())
    }

    async fn get_symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>, AdapterError> {
        let record: Option<SymbolRecord> = self.get_optional(&format!("/symbols/{symbol}")).await?;
        Ok(record.map(SymbolInfo::from))
    }

    async fn get_latest_tick(&self, symbol: &str) -> Result<Option<Tick>, AdapterError> {
        let record: Option<TickRecord> =
            self.get_optional(&format!("/symbols/{symbol}/tick")).await?;
        // The terminal does not timestamp quotes.
        Ok(record.map(|t| Tick {
            symbol: symbol.to_string(),
            bid: t.bid,
            ask: t.ask,
            last: t.last,
            time: Utc::now(),
        }))
    }

    async fn get_historical_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>, AdapterError> {
        let query = [
            ("timeframe", terminal_timeframe(timeframe).to_string()),
            ("from", start.timestamp().to_string()),
            ("to", end.timestamp().to_string()),
        ];
        let rates: Vec<RateRecord> = self
            .get(&format!("/symbols/{symbol}/rates"), &query)
            .await?;
        rates
            .into_iter()
            .map(|r| {
                Ok(Kline {
                    time: from_unix(r.time)?,
                    open: r.open,
                    high: r.high,
                    low: r.low,
                    close: r.close,
                    volume: r.tick_volume,
                })
            })
            .collect()
    }

    async fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> Result<PlaceOrderResult, AdapterError> {
        if request.order_type == OrderType::Limit && request.price.is_none() {
            return Err(AdapterError::Validation(
                "LIMIT order requires a price".to_string(),
            ));
        }
        let token = self.token().await?;
        let client_id = request.client_order_id.to_string();
        let body = OrderSendRequest {
            symbol: &request.symbol,
            volume: request.quantity,
            order_type: terminal_order_type(request.side, request.order_type),
            price: request.price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            comment: &request.comment,
            client_id: &client_id,
        };
        let http_request = self
            .http
            .client()
            .post(self.url("/orders"))
            .bearer_auth(token)
            .json(&body);
        let result: TradeResult = self.session_checked(self.http.write(http_request).await)?;

        let success = is_success(result.retcode);
        let filled = if success && result.deal_id.is_some() {
            result.volume
        } else {
            Decimal::ZERO
        };
        let message = if result.comment.is_empty() {
            format!("retcode {}", result.retcode)
        } else {
            result.comment
        };

        Ok(PlaceOrderResult {
            success,
            retcode: result.retcode,
            exchange_order_id: result.order_id.map(|id| id.to_string()),
            deal_id: result.deal_id.map(|id| id.to_string()),
            filled_quantity: filled,
            fill_price: (filled > Decimal::ZERO).then_some(result.price),
            message,
        })
    }

    async fn cancel_order(
        &self,
        exchange_order_id: &str,
        _symbol: &str,
    ) -> Result<CancelResult, AdapterError> {
        let token = self.token().await?;
        let request = self
            .http
            .client()
            .delete(self.url(&format!("/orders/{exchange_order_id}")))
            .bearer_auth(token);
        let result: TradeResult = self.session_checked(self.http.write(request).await)?;

        if !is_success(result.retcode) {
            return Err(AdapterError::Rejected(format!(
                "retcode {}: {}",
                result.retcode, result.comment
            )));
        }
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
        let Some(record) = self
            .get_optional::<OrderRecord>(&format!("/orders/{exchange_order_id}"))
            .await?
        else {
            return Ok(None);
        };
        let phase = order_phase(&record.state);
        let filled = record.filled_volume();
        let average_price = record
            .price_average
            .or_else(|| (filled > Decimal::ZERO).then_some(record.price_open));
        let reason = (phase == VenueOrderPhase::Rejected).then(|| {
            if record.comment.is_empty() {
                record.state.clone()
            } else {
                record.comment.clone()
            }
        });
        Ok(Some(VenueOrderState {
            exchange_order_id: record.ticket.to_string(),
            phase,
            filled_quantity: filled,
            average_price,
            reason,
            updated_at: from_unix(record.time_done.unwrap_or(record.time_setup))?,
        }))
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>, AdapterError> {
        let records: Vec<PositionRecord> = self.get("/positions", &[]).await?;
        records
            .into_iter()
            .map(|p| {
                Ok(Position {
                    ticket: p.ticket.to_string(),
                    symbol: p.symbol,
                    side: if p.position_type == "POSITION_TYPE_BUY" {
                        OrderSide::Buy
                    } else {
                        OrderSide::Sell
                    },
                    volume: p.volume,
                    price_open: p.price_open,
                    price_current: p.price_current,
                    profit: p.profit,
                    opened_at: Some(from_unix(p.time)?),
                })
            })
            .collect()
    }

    async fn get_trade_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, AdapterError> {
        let query = [
            ("from", start.timestamp().to_string()),
            ("to", end.timestamp().to_string()),
        ];
        let deals: Vec<DealRecord> = self.get("/deals", &query).await?;
        deals
            .into_iter()
            .filter_map(|d| {
                // Balance, credit and commission deals carry no execution.
                let side = match d.deal_type.as_str() {
                    "DEAL_TYPE_BUY" => OrderSide::Buy,
                    "DEAL_TYPE_SELL" => OrderSide::Sell,
                    _ => return None,
                };
                Some(from_unix(d.time).map(|time| Trade {
                    ticket: d.ticket.to_string(),
                    exchange_order_id: d.order.to_string(),
                    symbol: d.symbol,
                    side,
                    volume: d.volume,
                    price: d.price,
                    profit: d.profit,
                    time,
                }))
            })
            .collect()
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, AdapterError> {
        let account: AccountRecord = self.get("/account", &[]).await?;
        Ok(AccountBalance {
            currency: account.currency,
            balance: account.balance,
            equity: account.equity,
            free_margin: account.margin_free,
            assets: Vec::new(),
        })
    }
}

impl From<SymbolRecord> for SymbolInfo {
    fn from(r: SymbolRecord) -> Self {
        Self {
            symbol: r.name,
            description: r.description,
            base_currency: r.currency_base,
            quote_currency: r.currency_profit,
            volume_min: r.volume_min,
            volume_max: r.volume_max,
            volume_step: r.volume_step,
            contract_size: r.trade_contract_size.unwrap_or(Decimal::ONE),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::domain::shared::OrderId;
    use crate::resilience::RetryConfig;

    fn config(server: &MockServer) -> CfdVenueConfig {
        CfdVenueConfig {
            enabled: true,
            gateway_url: server.uri(),
            login: "5001".to_string(),
            password: "pw".to_string(),
            server: "Broker-Demo".to_string(),
            retry: RetryConfig::fixed(1, Duration::from_millis(10)),
            ..CfdVenueConfig::default()
        }
    }

    async fn connected(server: &MockServer) -> CfdAdapter {
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_partial_json(json!({"login": "5001", "server": "Broker-Demo"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t-1"})))
            .mount(server)
            .await;
        let adapter = CfdAdapter::new(config(server)).unwrap();
        adapter.connect().await.unwrap();
        adapter
    }

    fn request(order_type: OrderType, price: Option<Decimal>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            client_order_id: OrderId::new("ord-9"),
            symbol: "EURUSD".to_string(),
            side: OrderSide::Sell,
            order_type,
            quantity: dec!(0.10),
            price,
            stop_loss: Some(dec!(1.2)),
            take_profit: None,
            comment: "orchestrator".to_string(),
        }
    }

    #[tokio::test]
    async fn connect_without_credentials_fails() {
        let server = MockServer::start().await;
        let adapter = CfdAdapter::new(CfdVenueConfig {
            password: String::new(),
            ..config(&server)
        })
        .unwrap();

        assert!(matches!(
            adapter.connect().await,
            Err(AdapterError::Connection(_))
        ));
        assert_eq!(adapter.status(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn reads_require_a_session() {
        let server = MockServer::start().await;
        let adapter = CfdAdapter::new(config(&server)).unwrap();
        assert!(matches!(
            adapter.get_open_positions().await,
            Err(AdapterError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn tick_uses_wall_clock_time() {
        let server = MockServer::start().await;
        let adapter = connected(&server).await;
        Mock::given(method("GET"))
            .and(path("/symbols/EURUSD/tick"))
            .and(header("authorization", "Bearer t-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"bid": 1.1, "ask": 1.1002})),
            )
            .mount(&server)
            .await;

        let before = Utc::now();
        let tick = adapter.get_latest_tick("EURUSD").await.unwrap().unwrap();
        assert_eq!(tick.ask, dec!(1.1002));
        assert!(tick.time >= before);
    }

    #[tokio::test]
    async fn unknown_symbol_is_none() {
        let server = MockServer::start().await;
        let adapter = connected(&server).await;
        Mock::given(method("GET"))
            .and(path("/symbols/NOPE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(adapter.get_symbol_info("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn monthly_rates_are_supported() {
        let server = MockServer::start().await;
        let adapter = connected(&server).await;
        Mock::given(method("GET"))
            .and(path("/symbols/EURUSD/rates"))
            .and(query_param("timeframe", "MN1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"time": 1_700_000_000, "open": 1.0, "high": 1.2, "low": 0.9, "close": 1.1, "tickVolume": 500}
            ])))
            .mount(&server)
            .await;

        let bars = adapter
            .get_historical_klines("EURUSD", Timeframe::MN1, Utc::now(), Utc::now())
            .await
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, dec!(500));
    }

    #[tokio::test]
    async fn executed_market_order_reports_deal() {
        let server = MockServer::start().await;
        let adapter = connected(&server).await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(body_partial_json(json!({"type": "ORDER_TYPE_SELL", "clientId": "ord-9"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retcode": 10009, "orderId": 555, "dealId": 777, "volume": 0.1, "price": 1.0995, "comment": "Request executed"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = adapter
            .place_order(&request(OrderType::Market, None))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.retcode, 10009);
        assert_eq!(result.deal_id.as_deref(), Some("777"));
        assert_eq!(result.fill_price, Some(dec!(1.0995)));
    }

    #[tokio::test]
    async fn refused_retcode_is_unsuccessful_result() {
        let server = MockServer::start().await;
        let adapter = connected(&server).await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retcode": 10019, "comment": "No money"
            })))
            .mount(&server)
            .await;

        let result = adapter
            .place_order(&request(OrderType::Limit, Some(dec!(1.2))))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "No money");
        assert!(!result.has_synchronous_fill());
    }

    #[tokio::test]
    async fn placed_order_without_deal_is_polled_by_ticket() {
        let server = MockServer::start().await;
        let adapter = connected(&server).await;
        Mock::given(method("GET"))
            .and(path("/orders/556"))
            .and(header("authorization", "Bearer t-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ticket": 556, "state": "ORDER_STATE_FILLED",
                "volumeInitial": 0.1, "volumeCurrent": 0, "priceOpen": 1.2,
                "priceAverage": 1.1998, "timeSetup": 1_700_000_000, "timeDone": 1_700_000_060
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orders/999"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let state = adapter
            .get_order_state("556", "EURUSD")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.phase, VenueOrderPhase::Done);
        assert_eq!(state.filled_quantity, dec!(0.1));
        assert_eq!(state.average_price, Some(dec!(1.1998)));
        assert_eq!(state.updated_at.timestamp(), 1_700_000_060);

        assert!(adapter.get_order_state("999", "EURUSD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejected_order_state_carries_comment() {
        let server = MockServer::start().await;
        let adapter = connected(&server).await;
        Mock::given(method("GET"))
            .and(path("/orders/557"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ticket": 557, "state": "ORDER_STATE_REJECTED",
                "volumeInitial": 0.1, "volumeCurrent": 0.1,
                "comment": "Market closed", "timeSetup": 1_700_000_000
            })))
            .mount(&server)
            .await;

        let state = adapter
            .get_order_state("557", "EURUSD")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.phase, VenueOrderPhase::Rejected);
        assert_eq!(state.filled_quantity, Decimal::ZERO);
        assert!(state.average_price.is_none());
        assert_eq!(state.reason.as_deref(), Some("Market closed"));
    }

    #[tokio::test]
    async fn refused_cancel_is_rejected() {
        let server = MockServer::start().await;
        let adapter = connected(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/orders/555"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retcode": 10013, "comment": "Invalid request"
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            adapter.cancel_order("555", "EURUSD").await,
            Err(AdapterError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn expired_session_marks_error() {
        let server = MockServer::start().await;
        let adapter = connected(&server).await;
        Mock::given(method("GET"))
            .and(path("/account"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        assert!(adapter.get_account_balance().await.is_err());
        assert_eq!(adapter.status(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn history_skips_non_trade_deals() {
        let server = MockServer::start().await;
        let adapter = connected(&server).await;
        Mock::given(method("GET"))
            .and(path("/deals"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"ticket": 1, "order": 0, "symbol": "", "type": "DEAL_TYPE_BALANCE", "volume": 0, "price": 0, "profit": 1000, "time": 1_700_000_000},
                {"ticket": 2, "order": 555, "symbol": "EURUSD", "type": "DEAL_TYPE_SELL", "volume": 0.1, "price": 1.0995, "profit": 0, "time": 1_700_000_100}
            ])))
            .mount(&server)
            .await;

        let trades = adapter
            .get_trade_history(Utc::now(), Utc::now())
            .await
            .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exchange_order_id, "555");
        assert_eq!(trades[0].side, OrderSide::Sell);
    }
}
