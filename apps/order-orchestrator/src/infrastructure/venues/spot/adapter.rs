//! Spot adapter implementation.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Method, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::api_types::{
    AccountInfo, CancelResponse, ExchangeInfo, MyTrade, OrderResponse, QueriedOrder, SymbolEntry,
    Ticker24h,
};
use super::error::{INVALID_SYMBOL, NO_SUCH_ORDER, SpotError};
use super::signing::sign_url;
use crate::application::ports::{
    AccountBalance, AdapterError, AssetBalance, CancelResult, ConnectionStatus, ExchangeAdapter,
    Kline, PlaceOrderRequest, PlaceOrderResult, Position, SymbolInfo, Tick, Timeframe, Trade,
    VenueOrderPhase, VenueOrderState,
};
use crate::config::SpotVenueConfig;
use crate::domain::order_execution::{OrderSide, OrderType};
use crate::domain::shared::VenueName;
use crate::infrastructure::venues::http::HttpExecutor;
use crate::infrastructure::venues::status::StatusCell;

const API_KEY_HEADER: &str = "X-MBX-APIKEY";
const KLINE_LIMIT: usize = 1000;

/// Venue interval for a platform timeframe. Monthly bars are not offered.
const fn interval(timeframe: Timeframe) -> Option<&'static str> {
    match timeframe {
        Timeframe::M1 => Some("1m"),
        Timeframe::M5 => Some("5m"),
        Timeframe::M15 => Some("15m"),
        Timeframe::M30 => Some("30m"),
        Timeframe::H1 => Some("1h"),
        Timeframe::H4 => Some("4h"),
        Timeframe::D1 => Some("1d"),
        Timeframe::W1 => Some("1w"),
        Timeframe::MN1 => None,
    }
}

fn order_phase(status: &str) -> VenueOrderPhase {
    match status {
        "FILLED" => VenueOrderPhase::Done,
        "CANCELED" => VenueOrderPhase::Canceled,
        "REJECTED" => VenueOrderPhase::Rejected,
        "EXPIRED" | "EXPIRED_IN_MATCH" => VenueOrderPhase::Expired,
        _ => VenueOrderPhase::Working,
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, AdapterError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AdapterError::Protocol(format!("Invalid timestamp: {ms}")))
}

/// Spot exchange adapter.
pub struct SpotAdapter {
    venue: VenueName,
    config: SpotVenueConfig,
    base: Url,
    http: HttpExecutor,
    status: StatusCell,
}

impl std::fmt::Debug for SpotAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotAdapter")
            .field("venue", &self.venue)
            .field("base", &self.base.as_str())
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}

impl SpotAdapter {
    /// Create an adapter. Does not touch the network.
    pub fn new(config: SpotVenueConfig) -> Result<Self, AdapterError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| AdapterError::Validation(format!("Invalid spot base_url: {e}")))?;
        let http = HttpExecutor::new(config.timeout(), config.retry.clone())?;
        Ok(Self {
            venue: VenueName::new(&config.name),
            config,
            base,
            http,
            status: StatusCell::new(),
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        url
    }

    fn signed_endpoint(&self, path: &str, params: &[(&str, String)]) -> Url {
        let mut url = self.endpoint(path, params);
        sign_url(
            &mut url,
            &self.config.api_secret,
            self.config.recv_window_ms,
            Utc::now().timestamp_millis(),
        );
        url
    }

    fn has_credentials(&self) -> bool {
        !self.config.api_key.is_empty() && !self.config.api_secret.is_empty()
    }

    async fn public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, SpotError> {
        let url = self.endpoint(path, params);
        Ok(self.http.read(|c| c.get(url.clone())).await?)
    }

    /// Signed GET. The signature and timestamp are recomputed per attempt.
    async fn signed_read<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, SpotError> {
        if !self.has_credentials() {
            return Err(SpotError::MissingCredentials);
        }
        Ok(self
            .http
            .read(|c| {
                c.get(self.signed_endpoint(path, params))
                    .header(API_KEY_HEADER, &self.config.api_key)
            })
            .await?)
    }

    async fn signed_write<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, SpotError> {
        if !self.has_credentials() {
            return Err(SpotError::MissingCredentials);
        }
        let request = self
            .http
            .client()
            .request(method, self.signed_endpoint(path, params))
            .header(API_KEY_HEADER, &self.config.api_key);
        Ok(self.http.write(request).await?)
    }

    async fn handshake(&self) -> Result<(), SpotError> {
        if !self.has_credentials() {
            return Err(SpotError::MissingCredentials);
        }
        let _: Value = self.public("/api/v3/ping", &[]).await?;
        let _: AccountInfo = self.signed_read("/api/v3/account", &[]).await?;
        Ok(())
    }

    fn to_symbol_info(entry: &SymbolEntry) -> SymbolInfo {
        let (volume_min, volume_max, volume_step) = entry
            .lot_size()
            .unwrap_or((Decimal::ZERO, Decimal::ZERO, Decimal::ZERO));
        SymbolInfo {
            symbol: entry.symbol.clone(),
            description: format!("{}/{}", entry.base_asset, entry.quote_asset),
            base_currency: entry.base_asset.clone(),
            quote_currency: entry.quote_asset.clone(),
            volume_min,
            volume_max,
            volume_step,
            contract_size: Decimal::ONE,
        }
    }

    /// Pairs worth scanning for executions: held assets against the quote
    /// currency plus the configured symbols.
    fn history_symbols(&self, account: &AccountInfo) -> BTreeSet<String> {
        let quote = &self.config.quote_currency;
        account
            .balances
            .iter()
            .filter(|b| !b.total().is_zero() && &b.asset != quote)
            .map(|b| format!("{}{quote}", b.asset))
            .chain(self.config.history_symbols.iter().cloned())
            .collect()
    }

    async fn trades_for(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, AdapterError> {
        // The venue caps a single query window at 24 hours.
        let window = ChronoDuration::hours(24) - ChronoDuration::milliseconds(1);
        let mut trades = Vec::new();
        let mut from = start;

        while from <= end {
            let to = (from + window).min(end);
            let params = [
                ("symbol", symbol.to_string()),
                ("startTime", from.timestamp_millis().to_string()),
                ("endTime", to.timestamp_millis().to_string()),
                ("limit", "1000".to_string()),
            ];
            let page: Vec<MyTrade> = match self.signed_read("/api/v3/myTrades", &params).await {
                Ok(page) => page,
                Err(e) if e.code() == Some(INVALID_SYMBOL) => {
                    debug!(venue = %self.venue, symbol, "Skipping unlisted pair");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e.into()),
            };

            for t in page {
                trades.push(Trade {
                    ticket: t.id.to_string(),
                    exchange_order_id: t.order_id.to_string(),
                    symbol: t.symbol,
                    side: if t.is_buyer {
                        OrderSide::Buy
                    } else {
                        OrderSide::Sell
                    },
                    volume: t.qty,
                    price: t.price,
                    profit: if t.commission_asset == self.config.quote_currency {
                        -t.commission
                    } else {
                        Decimal::ZERO
                    },
                    time: from_millis(t.time)?,
                });
            }
            from = to + ChronoDuration::milliseconds(1);
        }
        Ok(trades)
    }
}

fn parse_kline(row: &[Value]) -> Result<Kline, AdapterError> {
    let decimal = |idx: usize| -> Result<Decimal, AdapterError> {
        let raw = row
            .get(idx)
            .ok_or_else(|| AdapterError::Protocol(format!("Kline row missing field {idx}")))?;
        let parsed = match raw {
            Value::String(s) => s.parse::<Decimal>().ok(),
            Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| AdapterError::Protocol(format!("Invalid kline field {idx}: {raw}")))
    };
    let open_time = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| AdapterError::Protocol("Kline row missing open time".to_string()))?;

    Ok(Kline {
        time: from_millis(open_time)?,
        open: decimal(1)?,
        high: decimal(2)?,
        low: decimal(3)?,
        close: decimal(4)?,
        volume: decimal(5)?,
    })
}

#[async_trait]
impl ExchangeAdapter for SpotAdapter {
    fn venue(&self) -> &VenueName {
        &self.venue
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        if self.status.get().is_connected() {
            return Ok(());
        }
        self.status.set(ConnectionStatus::Connecting);

        match self.handshake().await {
            Ok(()) => {
                self.status.set(ConnectionStatus::Connected);
                info!(venue = %self.venue, base_url = %self.base, "Spot venue connected");
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
        match self.public::<Value>("/api/v3/ping", &[]).await {
            Ok(_) => ConnectionStatus::Connected,
            Err(e) => {
                warn!(venue = %self.venue, error = %e, "Spot ping failed");
                self.status.set(ConnectionStatus::Error);
                ConnectionStatus::Error
            }
        }
    }

    async fn get_all_symbols(&self) -> Result<Vec<SymbolInfo>, AdapterError> {
        let info: ExchangeInfo = self.public("/api/v3/exchangeInfo", &[]).await?;
        Ok(info
            .symbols
            .iter()
            .filter(|s| s.is_spot_tradable())
            .map(Self::to_symbol_info)
            .collect())
    }

    async fn get_symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>, AdapterError> {
        let params = [("symbol", symbol.to_string())];
        match self.public::<ExchangeInfo>("/api/v3/exchangeInfo", &params).await {
            Ok(info) => Ok(info
                .symbols
                .iter()
                .find(|s| s.symbol == symbol)
                .map(Self::to_symbol_info)),
            Err(e) if e.code() == Some(INVALID_SYMBOL) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_latest_tick(&self, symbol: &str) -> Result<Option<Tick>, AdapterError> {
        let params = [("symbol", symbol.to_string())];
        match self.public::<Ticker24h>("/api/v3/ticker/24hr", &params).await {
            Ok(t) => Ok(Some(Tick {
                symbol: symbol.to_string(),
                bid: t.bid_price,
                ask: t.ask_price,
                last: t.last_price,
                time: from_millis(t.close_time)?,
            })),
            Err(e) if e.code() == Some(INVALID_SYMBOL) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_historical_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Kline>, AdapterError> {
        let interval = interval(timeframe)
            .ok_or_else(|| AdapterError::UnsupportedTimeframe(timeframe.token().to_string()))?;

        let mut klines = Vec::new();
        let mut from = start.timestamp_millis();
        let end_ms = end.timestamp_millis();

        while from <= end_ms {
            let params = [
                ("symbol", symbol.to_string()),
                ("interval", interval.to_string()),
                ("startTime", from.to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", KLINE_LIMIT.to_string()),
            ];
            let rows: Vec<Vec<Value>> = self.public("/api/v3/klines", &params).await?;
            let page = rows
                .iter()
                .map(|row| parse_kline(row))
                .collect::<Result<Vec<_>, _>>()?;

            let full = page.len() == KLINE_LIMIT;
            let Some(last) = page.last() else { break };
            from = last.time.timestamp_millis() + 1;
            klines.extend(page);
            if !full {
                break;
            }
        }
        Ok(klines)
    }

    async fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> Result<PlaceOrderResult, AdapterError> {
        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.as_str().to_string()),
            ("type", request.order_type.as_str().to_string()),
            ("quantity", request.quantity.normalize().to_string()),
            ("newClientOrderId", request.client_order_id.to_string()),
            ("newOrderRespType", "FULL".to_string()),
        ];
        if request.order_type == OrderType::Limit {
            let price = request.price.ok_or_else(|| {
                AdapterError::Validation("LIMIT order requires a price".to_string())
            })?;
            params.push(("price", price.normalize().to_string()));
            params.push(("timeInForce", "GTC".to_string()));
        }
        if request.stop_loss.is_some() || request.take_profit.is_some() {
            debug!(
                venue = %self.venue,
                order_id = %request.client_order_id,
                "Spot venue ignores attached stop loss / take profit"
            );
        }

        let resp: OrderResponse = self
            .signed_write(Method::POST, "/api/v3/order", &params)
            .await?;

        let success = !matches!(resp.status.as_str(), "REJECTED" | "EXPIRED");
        Ok(PlaceOrderResult {
            success,
            retcode: 0,
            exchange_order_id: Some(resp.order_id.to_string()),
            deal_id: resp.fills.first().map(|f| f.trade_id.to_string()),
            filled_quantity: resp.executed_qty,
            fill_price: resp.average_price(),
            message: resp.status.clone(),
        })
    }

    async fn cancel_order(
        &self,
        exchange_order_id: &str,
        symbol: &str,
    ) -> Result<CancelResult, AdapterError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", exchange_order_id.to_string()),
        ];
        let resp: CancelResponse = self
            .signed_write(Method::DELETE, "/api/v3/order", &params)
            .await?;
        Ok(CancelResult {
            exchange_order_id: resp.order_id.to_string(),
            status: resp.status,
        })
    }

    async fn get_order_state(
        &self,
        exchange_order_id: &str,
        symbol: &str,
    ) -> Result<Option<VenueOrderState>, AdapterError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", exchange_order_id.to_string()),
        ];
        let order: QueriedOrder = match self.signed_read("/api/v3/order", &params).await {
            Ok(order) => order,
            Err(e) if e.code() == Some(NO_SUCH_ORDER) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let phase = order_phase(&order.status);
        Ok(Some(VenueOrderState {
            exchange_order_id: order.order_id.to_string(),
            phase,
            filled_quantity: order.executed_qty,
            average_price: order.average_price(),
            reason: (phase == VenueOrderPhase::Rejected).then(|| order.status.clone()),
            updated_at: from_millis(order.update_time)?,
        }))
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>, AdapterError> {
        let account: AccountInfo = self.signed_read("/api/v3/account", &[]).await?;
        let quote = &self.config.quote_currency;

        let held: Vec<_> = account
            .balances
            .iter()
            .filter(|b| !b.total().is_zero() && &b.asset != quote)
            .collect();

        let ticks = futures::future::try_join_all(
            held.iter()
                .map(|b| self.get_latest_tick_owned(format!("{}{quote}", b.asset))),
        )
        .await?;

        Ok(held
            .into_iter()
            .zip(ticks)
            .map(|(balance, (symbol, tick))| Position {
                ticket: balance.asset.clone(),
                symbol,
                side: OrderSide::Buy,
                volume: balance.total(),
                price_open: Decimal::ZERO,
                price_current: tick.map_or(Decimal::ZERO, |t| t.last),
                profit: Decimal::ZERO,
                opened_at: None,
            })
            .collect())
    }

    async fn get_trade_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, AdapterError> {
        let account: AccountInfo = self.signed_read("/api/v3/account", &[]).await?;
        let mut trades = Vec::new();
        for symbol in self.history_symbols(&account) {
            trades.extend(self.trades_for(&symbol, start, end).await?);
        }
        trades.sort_by_key(|t| t.time);
        Ok(trades)
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, AdapterError> {
        let account: AccountInfo = self.signed_read("/api/v3/account", &[]).await?;
        let quote = &self.config.quote_currency;
        let cash = account.balances.iter().find(|b| &b.asset == quote);

        Ok(AccountBalance {
            currency: quote.clone(),
            balance: cash.map_or(Decimal::ZERO, |b| b.total()),
            equity: cash.map_or(Decimal::ZERO, |b| b.total()),
            free_margin: Some(cash.map_or(Decimal::ZERO, |b| b.free)),
            assets: account
                .balances
                .iter()
                .filter(|b| !b.total().is_zero())
                .map(|b| AssetBalance {
                    asset: b.asset.clone(),
                    free: b.free,
                    locked: b.locked,
                })
                .collect(),
        })
    }
}

impl SpotAdapter {
    async fn get_latest_tick_owned(
        &self,
        symbol: String,
    ) -> Result<(String, Option<Tick>), AdapterError> {
        let tick = self.get_latest_tick(&symbol).await?;
        Ok((symbol, tick))
    }
}
