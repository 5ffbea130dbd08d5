//! Spot exchange REST payloads.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Error body returned with 4xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Negative venue error code.
    pub code: i64,
    /// Venue message.
    pub msg: String,
}

/// `GET /api/v3/exchangeInfo`.
#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolEntry {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub is_spot_trading_allowed: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

impl SymbolEntry {
    /// Listed and tradable on the spot market.
    pub fn is_spot_tradable(&self) -> bool {
        self.status == "TRADING"
            && (self.is_spot_trading_allowed || self.permissions.iter().any(|p| p == "SPOT"))
    }

    /// The `LOT_SIZE` filter, if present.
    pub fn lot_size(&self) -> Option<(Decimal, Decimal, Decimal)> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::LotSize {
                min_qty,
                max_qty,
                step_size,
            } => Some((*min_qty, *max_qty, *step_size)),
            SymbolFilter::Other => None,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        min_qty: Decimal,
        max_qty: Decimal,
        step_size: Decimal,
    },
    #[serde(other)]
    Other,
}

/// `GET /api/v3/ticker/24hr`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub last_price: Decimal,
    pub close_time: i64,
}

/// `GET /api/v3/account`.
#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    pub balances: Vec<RawBalance>,
}

#[derive(Debug, Deserialize)]
pub struct RawBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl RawBalance {
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// `POST /api/v3/order` with `newOrderRespType=FULL`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    pub status: String,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub cummulative_quote_qty: Decimal,
    #[serde(default)]
    pub fills: Vec<OrderFill>,
}

impl OrderResponse {
    /// Volume-weighted price of the synchronous execution.
    pub fn average_price(&self) -> Option<Decimal> {
        if self.executed_qty.is_zero() {
            None
        } else {
            Some(self.cummulative_quote_qty / self.executed_qty)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFill {
    pub price: Decimal,
    pub qty: Decimal,
    pub trade_id: i64,
}

/// `GET /api/v3/order`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueriedOrder {
    pub order_id: i64,
    pub status: String,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub cummulative_quote_qty: Decimal,
    pub update_time: i64,
}

impl QueriedOrder {
    /// Volume-weighted price of everything executed so far.
    pub fn average_price(&self) -> Option<Decimal> {
        if self.executed_qty.is_zero() {
            None
        } else {
            Some(self.cummulative_quote_qty / self.executed_qty)
        }
    }
}

/// `DELETE /api/v3/order`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub order_id: i64,
    pub status: String,
}

/// One entry of `GET /api/v3/myTrades`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyTrade {
    pub id: i64,
    pub order_id: i64,
    pub symbol: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
    pub time: i64,
    pub is_buyer: bool,
}
