use async_trait::async_trait;
use common::{
    models::{
        CoinId, CoinListing, HistoryRange, MarketData, PriceHistory, PriceHistoryPoint, PriceMap,
    },
    Error, Result,
};
use connectors::PriceSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory price source; unknown history ids fail like an upstream 404
#[derive(Default)]
pub struct FakeSource {
    pub prices: PriceMap,
    pub histories: HashMap<CoinId, Vec<PriceHistoryPoint>>,
    pub fail: bool,
    /// 250 when unset
    pub max_ids: Option<usize>,
    spot_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_prices(pairs: &[(&str, f64)]) -> Self {
        Self {
            prices: pairs.iter().map(|(id, p)| (id.to_string(), *p)).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn spot_calls(&self) -> usize {
        self.spot_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            return Err(Error::UpstreamError("HTTP 503".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PriceSource for FakeSource {
    async fn fetch_spot_prices(&self, coin_ids: &[CoinId]) -> Result<PriceMap> {
        self.spot_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(coin_ids
            .iter()
            .filter_map(|id| self.prices.get(id).map(|p| (id.clone(), *p)))
            .collect())
    }

    async fn fetch_historical_series(
        &self,
        coin_id: &str,
        range: HistoryRange,
        currency: &str,
    ) -> Result<PriceHistory> {
        self.check()?;
        let data = self
            .histories
            .get(coin_id)
            .cloned()
            .ok_or_else(|| Error::UpstreamError(format!("HTTP 404 for {}", coin_id)))?;
        Ok(PriceHistory {
            coin_id: coin_id.to_string(),
            currency: currency.to_string(),
            range,
            data,
        })
    }

    async fn fetch_market_data(
        &self,
        coin_ids: &[CoinId],
        currency: &str,
    ) -> Result<Vec<MarketData>> {
        self.check()?;
        Ok(coin_ids
            .iter()
            .filter_map(|id| {
                self.prices.get(id).map(|p| MarketData {
                    coin_id: id.clone(),
                    symbol: id.to_uppercase(),
                    name: id.clone(),
                    image: None,
                    currency: currency.to_string(),
                    current_price: Some(*p),
                    market_cap: None,
                    market_cap_rank: None,
                    total_volume: None,
                    price_change_percentage_1h: None,
                    price_change_percentage_24h: None,
                    price_change_percentage_7d: None,
                    last_updated: None,
                })
            })
            .collect())
    }

    async fn search_coins(&self, _query: &str) -> Result<Vec<CoinListing>> {
        self.check()?;
        Ok(vec![])
    }

    async fn fetch_trending(&self) -> Result<Vec<CoinListing>> {
        self.check()?;
        Ok(vec![])
    }

    fn max_ids_per_call(&self) -> usize {
        self.max_ids.unwrap_or(250)
    }
}
