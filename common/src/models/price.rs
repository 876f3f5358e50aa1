use crate::models::CoinId;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// USD price per coin, as returned by a spot lookup.
pub type PriceMap = HashMap<CoinId, f64>;

/// Last known price of a coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub coin_id: CoinId,
    /// Spot price in USD
    pub usd_price: f64,
    /// When the poller (or a request path) observed this price
    pub observed_at: DateTime<Utc>,
}

/// Market overview of one coin, as served by the market data lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketData {
    pub coin_id: CoinId,
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
    /// Quote currency of every amount below
    pub currency: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub total_volume: Option<f64>,
    pub price_change_percentage_1h: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub price_change_percentage_7d: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Price history point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryPoint {
    /// Timestamp for this price point
    pub timestamp: DateTime<Utc>,
    /// The price at this point in time
    pub price: f64,
}

/// Historical price data for one coin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistory {
    pub coin_id: CoinId,
    /// Quote currency (e.g., "usd")
    pub currency: String,
    pub range: HistoryRange,
    /// Price data points, oldest first
    pub data: Vec<PriceHistoryPoint>,
}

/// Supported look-back windows for historical series
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HistoryRange {
    #[serde(rename = "1")]
    OneDay,
    #[serde(rename = "7")]
    SevenDays,
    #[serde(rename = "14")]
    FourteenDays,
    #[serde(rename = "30")]
    ThirtyDays,
    #[serde(rename = "90")]
    NinetyDays,
    #[serde(rename = "180")]
    HalfYear,
    #[serde(rename = "365")]
    OneYear,
    #[serde(rename = "max")]
    Max,
}

impl Default for HistoryRange {
    fn default() -> Self {
        HistoryRange::ThirtyDays
    }
}

impl std::fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryRange::OneDay => write!(f, "1"),
            HistoryRange::SevenDays => write!(f, "7"),
            HistoryRange::FourteenDays => write!(f, "14"),
            HistoryRange::ThirtyDays => write!(f, "30"),
            HistoryRange::NinetyDays => write!(f, "90"),
            HistoryRange::HalfYear => write!(f, "180"),
            HistoryRange::OneYear => write!(f, "365"),
            HistoryRange::Max => write!(f, "max"),
        }
    }
}

impl FromStr for HistoryRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(HistoryRange::OneDay),
            "7" => Ok(HistoryRange::SevenDays),
            "14" => Ok(HistoryRange::FourteenDays),
            "30" => Ok(HistoryRange::ThirtyDays),
            "90" => Ok(HistoryRange::NinetyDays),
            "180" => Ok(HistoryRange::HalfYear),
            "365" => Ok(HistoryRange::OneYear),
            "max" => Ok(HistoryRange::Max),
            unknown => Err(Error::ParseError(format!(
                "Unknown range: {}. Supported ranges: 1, 7, 14, 30, 90, 180, 365, max",
                unknown
            ))),
        }
    }
}
