//! Market data types shared by all venues.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::exchange_port::AdapterError;
use crate::domain::order_execution::OrderSide;

/// Tradable instrument metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Venue symbol.
    pub symbol: String,
    /// Human-readable description.
    pub description: String,
    /// Base currency or asset.
    pub base_currency: String,
    /// Quote or profit currency.
    pub quote_currency: String,
    /// Minimum order volume.
    pub volume_min: Decimal,
    /// Maximum order volume.
    pub volume_max: Decimal,
    /// Volume increment.
    pub volume_step: Decimal,
    /// Units per lot (1 for venues without contracts).
    pub contract_size: Decimal,
}

/// Best bid/ask snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Venue symbol.
    pub symbol: String,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Last traded price.
    pub last: Decimal,
    /// Quote time. Wall-clock time for venues without tick timestamps.
    pub time: DateTime<Utc>,
}

impl Tick {
    /// Executable price for a side: the ask for BUY, the bid for SELL.
    #[must_use]
    pub const fn price_for(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.ask,
            OrderSide::Sell => self.bid,
        }
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kline {
    /// Bar open time.
    pub time: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: Decimal,
}

/// Platform-neutral bar size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1 minute.
    #[serde(rename = "1M")]
    M1,
    /// 5 minutes.
    #[serde(rename = "5M")]
    M5,
    /// 15 minutes.
    #[serde(rename = "15M")]
    M15,
    /// 30 minutes.
    #[serde(rename = "30M")]
    M30,
    /// 1 hour.
    #[serde(rename = "1H")]
    H1,
    /// 4 hours.
    #[serde(rename = "4H")]
    H4,
    /// 1 day.
    #[serde(rename = "1D")]
    D1,
    /// 1 week.
    #[serde(rename = "1W")]
    W1,
    /// 1 month.
    #[serde(rename = "1MN")]
    MN1,
}

impl Timeframe {
    const ALL: [Self; 9] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H4,
        Self::D1,
        Self::W1,
        Self::MN1,
    ];

    /// Platform token.
    #[must_use]
    pub const fn token(&self) -> &'static str {
        match self {
            Self::M1 => "1M",
            Self::M5 => "5M",
            Self::M15 => "15M",
            Self::M30 => "30M",
            Self::H1 => "1H",
            Self::H4 => "4H",
            Self::D1 => "1D",
            Self::W1 => "1W",
            Self::MN1 => "1MN",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Timeframe {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|tf| tf.token() == upper)
            .ok_or_else(|| AdapterError::Validation(format!("Unsupported timeframe: {s}")))
    }
}
