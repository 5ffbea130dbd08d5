//! MT5 gateway payloads.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request completed.
pub const TRADE_RETCODE_DONE: i64 = 10009;
/// Order placed.
pub const TRADE_RETCODE_PLACED: i64 = 10008;
/// Request completed partially.
pub const TRADE_RETCODE_DONE_PARTIAL: i64 = 10010;

pub const fn is_success(retcode: i64) -> bool {
    matches!(
        retcode,
        TRADE_RETCODE_DONE | TRADE_RETCODE_PLACED | TRADE_RETCODE_DONE_PARTIAL
    )
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub login: &'a str,
    pub password: &'a str,
    pub server: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionState {
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub currency_base: String,
    #[serde(default)]
    pub currency_profit: String,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub volume_step: Decimal,
    #[serde(default)]
    pub trade_contract_size: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct TickRecord {
    pub bid: Decimal,
    pub ask: Decimal,
    #[serde(default)]
    pub last: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRecord {
    /// Unix seconds.
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub tick_volume: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSendRequest<'a> {
    pub symbol: &'a str,
    pub volume: Decimal,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub comment: &'a str,
    pub client_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResult {
    pub retcode: i64,
    #[serde(default)]
    pub order_id: Option<u64>,
    #[serde(default)]
    pub deal_id: Option<u64>,
    #[serde(default)]
    pub volume: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub comment: String,
}

/// `GET /orders/{ticket}`: a working or historical order.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub ticket: u64,
    pub state: String,
    pub volume_initial: Decimal,
    /// Unexecuted remainder.
    pub volume_current: Decimal,
    #[serde(default)]
    pub price_open: Decimal,
    /// Average execution price, when the gateway has deals for the order.
    #[serde(default)]
    pub price_average: Option<Decimal>,
    #[serde(default)]
    pub comment: String,
    /// Unix seconds.
    pub time_setup: i64,
    /// Unix seconds, set once the order left the book.
    #[serde(default)]
    pub time_done: Option<i64>,
}

impl OrderRecord {
    /// Volume executed so far.
    pub fn filled_volume(&self) -> Decimal {
        (self.volume_initial - self.volume_current).max(Decimal::ZERO)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub position_type: String,
    pub volume: Decimal,
    pub price_open: Decimal,
    pub price_current: Decimal,
    #[serde(default)]
    pub profit: Decimal,
    /// Unix seconds.
    pub time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRecord {
    pub ticket: u64,
    pub order: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub deal_type: String,
    pub volume: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub profit: Decimal,
    /// Unix seconds.
    pub time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub currency: String,
    pub balance: Decimal,
    pub equity: Decimal,
    #[serde(default)]
    pub margin_free: Option<Decimal>,
}
