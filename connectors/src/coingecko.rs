use crate::PriceSource;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::{
    models::{
        CoinId, CoinListing, HistoryRange, MarketData, PriceHistory, PriceHistoryPoint, PriceMap,
    },
    Error, Result,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_MAX_IDS_PER_CALL: usize = 250;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Connection settings for the CoinGecko API
#[derive(Debug, Clone)]
pub struct CoinGeckoConfig {
    pub base_url: String,
    /// Sent as `x-cg-demo-api-key`, or `x-cg-pro-api-key` against the pro host
    pub api_key: Option<String>,
    /// Applied to every request
    pub timeout: Duration,
    pub max_ids_per_call: usize,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            base_url: COINGECKO_API_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_ids_per_call: DEFAULT_MAX_IDS_PER_CALL,
        }
    }
}

pub struct CoinGeckoConnector {
    client: reqwest::Client,
    config: CoinGeckoConfig,
}

impl CoinGeckoConnector {
    pub fn new(config: CoinGeckoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn api_key_header(&self) -> &'static str {
        if self.config.base_url.contains("pro-api") {
            "x-cg-pro-api-key"
        } else {
            "x-cg-demo-api-key"
        }
    }

    /// GET `path` and return the body of a successful response
    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        debug!("Fetching from CoinGecko: {} {:?}", url, query);

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.header(self.api_key_header(), key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::UpstreamError(format!(
                    "CoinGecko request to {} timed out after {:?}",
                    path, self.config.timeout
                ))
            } else {
                Error::HttpError(e)
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            error!("CoinGecko rate limit hit on {}", path);
            return Err(Error::UpstreamError(format!(
                "CoinGecko rate limited request to {}",
                path
            )));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("CoinGecko API error: {} - {}", status, error_text);
            return Err(Error::UpstreamError(format!(
                "CoinGecko API error: {} - {}",
                status, error_text
            )));
        }

        response.text().await.map_err(Error::HttpError)
    }
}

#[derive(Debug, Deserialize)]
struct GeckoCoin {
    id: String,
    name: String,
    symbol: String,
    market_cap_rank: Option<u32>,
    thumb: Option<String>,
}

impl From<GeckoCoin> for CoinListing {
    fn from(coin: GeckoCoin) -> Self {
        CoinListing {
            id: coin.id,
            name: coin.name,
            symbol: coin.symbol.to_uppercase(),
            market_cap_rank: coin.market_cap_rank,
            thumb: coin.thumb,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeckoMarket {
    id: String,
    symbol: String,
    name: String,
    image: Option<String>,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    market_cap_rank: Option<u32>,
    total_volume: Option<f64>,
    price_change_percentage_1h_in_currency: Option<f64>,
    price_change_percentage_24h_in_currency: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    price_change_percentage_7d_in_currency: Option<f64>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<GeckoCoin>,
}

#[derive(Debug, Deserialize)]
struct TrendingItem {
    item: GeckoCoin,
}

#[derive(Debug, Deserialize)]
struct TrendingResponse {
    #[serde(default)]
    coins: Vec<TrendingItem>,
}

fn malformed(what: &str, e: impl std::fmt::Display) -> Error {
    Error::UpstreamError(format!("Failed to parse CoinGecko {}: {}", what, e))
}

/// Parses a `/simple/price` body: `{"bitcoin": {"usd": 67000.1}, ...}`.
/// Entries without a usable `usd` field are skipped.
pub(crate) fn parse_simple_price(body: &str) -> Result<PriceMap> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| malformed("simple price", e))?;
    let entries = value
        .as_object()
        .ok_or_else(|| malformed("simple price", "expected an object keyed by coin id"))?;

    let mut prices = PriceMap::with_capacity(entries.len());
    for (coin_id, entry) in entries {
        match entry.get("usd").and_then(|v| v.as_f64()) {
            Some(price) if price.is_finite() && price >= 0.0 => {
                prices.insert(coin_id.clone(), price);
            }
            _ => debug!("CoinGecko returned no usable usd price for {}", coin_id),
        }
    }

    Ok(prices)
}

/// Parses the `prices` array of a `/coins/{id}/market_chart` body:
/// `[[timestamp_ms, price], ...]`. Malformed points are skipped and the
/// result is sorted oldest first.
pub(crate) fn parse_market_chart(body: &str) -> Result<Vec<PriceHistoryPoint>> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| malformed("market chart", e))?;
    let raw_points = value
        .get("prices")
        .and_then(|p| p.as_array())
        .ok_or_else(|| malformed("market chart", "missing prices array"))?;

    let mut data_points = Vec::with_capacity(raw_points.len());

    for raw in raw_points {
        let Some(pair) = raw.as_array().filter(|p| p.len() >= 2) else {
            continue;
        };

        let millis = match pair[0].as_i64().or_else(|| pair[0].as_f64().map(|f| f as i64)) {
            Some(ms) => ms,
            None => continue,
        };
        let Some(timestamp) = Utc.timestamp_millis_opt(millis).single() else {
            continue;
        };
        let price = match pair[1].as_f64() {
            Some(price) if price.is_finite() => price,
            _ => continue,
        };

        data_points.push(PriceHistoryPoint { timestamp, price });
    }

    data_points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    Ok(data_points)
}

/// Parses a `/coins/markets` body, an array of per-coin objects
pub(crate) fn parse_markets(body: &str, currency: &str) -> Result<Vec<MarketData>> {
    let markets: Vec<GeckoMarket> =
        serde_json::from_str(body).map_err(|e| malformed("market data", e))?;
    Ok(markets
        .into_iter()
        .map(|m| MarketData {
            coin_id: m.id,
            symbol: m.symbol.to_uppercase(),
            name: m.name,
            image: m.image,
            currency: currency.to_string(),
            current_price: m.current_price,
            market_cap: m.market_cap,
            market_cap_rank: m.market_cap_rank,
            total_volume: m.total_volume,
            price_change_percentage_1h: m.price_change_percentage_1h_in_currency,
            price_change_percentage_24h: m
                .price_change_percentage_24h_in_currency
                .or(m.price_change_percentage_24h),
            price_change_percentage_7d: m.price_change_percentage_7d_in_currency,
            last_updated: m.last_updated,
        })
        .collect())
}

/// Coin ids go into URL paths; only the characters provider ids use are let
/// through.
pub(crate) fn coin_path_segment(coin_id: &str) -> Result<String> {
    let id = coin_id.trim().to_lowercase();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(Error::ValidationError(format!(
            "Invalid coin id '{}'",
            coin_id
        )));
    }
    Ok(id)
}

pub(crate) fn parse_search(body: &str) -> Result<Vec<CoinListing>> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| malformed("search results", e))?;
    Ok(response.coins.into_iter().map(CoinListing::from).collect())
}

pub(crate) fn parse_trending(body: &str) -> Result<Vec<CoinListing>> {
    let response: TrendingResponse =
        serde_json::from_str(body).map_err(|e| malformed("trending coins", e))?;
    Ok(response
        .coins
        .into_iter()
        .map(|c| CoinListing::from(c.item))
        .collect())
}

#[async_trait]
impl PriceSource for CoinGeckoConnector {
    async fn fetch_spot_prices(&self, coin_ids: &[CoinId]) -> Result<PriceMap> {
        let mut prices = PriceMap::new();
        if coin_ids.is_empty() {
            return Ok(prices);
        }

        for chunk in coin_ids.chunks(self.max_ids_per_call()) {
            let body = self
                .get_text(
                    "/simple/price",
                    &[
                        ("ids", chunk.join(",")),
                        ("vs_currencies", "usd".to_string()),
                    ],
                )
                .await?;
            prices.extend(parse_simple_price(&body)?);
        }

        debug!(
            "CoinGecko returned {} of {} requested prices",
            prices.len(),
            coin_ids.len()
        );

        Ok(prices)
    }

    async fn fetch_historical_series(
        &self,
        coin_id: &str,
        range: HistoryRange,
        currency: &str,
    ) -> Result<PriceHistory> {
        let coin_id = coin_path_segment(coin_id)?;
        let currency = currency.to_lowercase();
        let body = self
            .get_text(
                &format!("/coins/{}/market_chart", coin_id),
                &[
                    ("vs_currency", currency.clone()),
                    ("days", range.to_string()),
                ],
            )
            .await?;

        Ok(PriceHistory {
            coin_id,
            currency,
            range,
            data: parse_market_chart(&body)?,
        })
    }

    async fn fetch_market_data(
        &self,
        coin_ids: &[CoinId],
        currency: &str,
    ) -> Result<Vec<MarketData>> {
        let mut markets = Vec::new();
        if coin_ids.is_empty() {
            return Ok(markets);
        }

        let currency = currency.to_lowercase();
        for chunk in coin_ids.chunks(self.max_ids_per_call()) {
            let body = self
                .get_text(
                    "/coins/markets",
                    &[
                        ("vs_currency", currency.clone()),
                        ("ids", chunk.join(",")),
                        ("order", "market_cap_desc".to_string()),
                        ("per_page", chunk.len().to_string()),
                        ("page", "1".to_string()),
                        ("sparkline", "false".to_string()),
                        ("price_change_percentage", "1h,24h,7d".to_string()),
                    ],
                )
                .await?;
            markets.extend(parse_markets(&body, &currency)?);
        }

        Ok(markets)
    }

    async fn search_coins(&self, query: &str) -> Result<Vec<CoinListing>> {
        let body = self
            .get_text("/search", &[("query", query.to_string())])
            .await?;
        parse_search(&body)
    }

    async fn fetch_trending(&self) -> Result<Vec<CoinListing>> {
        let body = self.get_text("/search/trending", &[]).await?;
        parse_trending(&body)
    }

    fn max_ids_per_call(&self) -> usize {
        self.config.max_ids_per_call.max(1)
    }
}
