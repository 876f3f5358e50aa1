pub mod coingecko;

use async_trait::async_trait;
use common::{
    models::{CoinId, CoinListing, HistoryRange, MarketData, PriceHistory, PriceMap},
    Result,
};

/// Trait defining the interface for upstream price providers
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Get USD spot prices for a set of coins.
    ///
    /// An empty slice returns an empty map without calling the provider.
    /// Coins the provider does not know are absent from the result.
    async fn fetch_spot_prices(&self, coin_ids: &[CoinId]) -> Result<PriceMap>;

    /// Get the price series of one coin over `range`, oldest first
    async fn fetch_historical_series(
        &self,
        coin_id: &str,
        range: HistoryRange,
        currency: &str,
    ) -> Result<PriceHistory>;

    /// Market cap, volume and 1h/24h/7d change for a set of coins, quoted
    /// in `currency`. Unknown coins are absent from the result.
    async fn fetch_market_data(
        &self,
        coin_ids: &[CoinId],
        currency: &str,
    ) -> Result<Vec<MarketData>>;

    /// Search coins by free text
    async fn search_coins(&self, query: &str) -> Result<Vec<CoinListing>>;

    /// List currently trending coins
    async fn fetch_trending(&self) -> Result<Vec<CoinListing>>;

    /// Largest number of ids accepted by a single spot-price call
    fn max_ids_per_call(&self) -> usize;
}
