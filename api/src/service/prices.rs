use chrono::{DateTime, Duration, Utc};
use common::{
    models::{
        CoinId, CoinListing, HistoryRange, MarketData, PriceHistory, PriceMap, PriceSnapshot,
    },
    Error, Result,
};
use connectors::PriceSource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use store::PriceCache;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const MIN_SEARCH_LEN: usize = 2;
const DEFAULT_MISS_TTL_SECS: i64 = 60;

/// Service for coin prices, backed by the shared cache and the upstream source
pub struct CoinService {
    source: Arc<dyn PriceSource>,
    cache: Arc<PriceCache>,
    /// Ids the provider did not know, and when it last said so
    misses: RwLock<HashMap<CoinId, DateTime<Utc>>>,
    miss_ttl: Duration,
}

impl CoinService {
    pub fn new(source: Arc<dyn PriceSource>, cache: Arc<PriceCache>) -> Self {
        Self {
            source,
            cache,
            misses: RwLock::new(HashMap::new()),
            miss_ttl: Duration::seconds(DEFAULT_MISS_TTL_SECS),
        }
    }

    /// How long an id the provider did not know is answered from memory
    /// instead of being asked for again. Usually one poll interval.
    pub fn with_miss_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.miss_ttl =
            Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(DEFAULT_MISS_TTL_SECS));
        self
    }

    /// Spot prices, cache first. Ids missing from the cache are fetched
    /// upstream and written back. An upstream failure is only surfaced when
    /// nothing at all could be served. At most one provider call's worth of
    /// ids is accepted.
    pub async fn get_prices(&self, coin_ids: &[CoinId]) -> Result<Vec<PriceSnapshot>> {
        let coin_ids = normalize_ids(coin_ids);
        if coin_ids.is_empty() {
            return Err(Error::ValidationError("No coin ids given".to_string()));
        }
        let max = self.source.max_ids_per_call();
        if coin_ids.len() > max {
            return Err(Error::ValidationError(format!(
                "At most {} coin ids per request",
                max
            )));
        }

        self.lookup(&coin_ids).await
    }

    /// Best-effort variant of [`CoinService::get_prices`]: upstream failures
    /// only shrink the result
    pub async fn snapshots_for(&self, coin_ids: &[CoinId]) -> Vec<PriceSnapshot> {
        let coin_ids = normalize_ids(coin_ids);
        if coin_ids.is_empty() {
            return vec![];
        }
        match self.lookup(&coin_ids).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!("No prices available for {} coins: {}", coin_ids.len(), e);
                vec![]
            }
        }
    }

    /// Whatever the cache holds for `coin_ids`; never calls the provider
    pub async fn cached_snapshots(&self, coin_ids: &[CoinId]) -> Vec<PriceSnapshot> {
        let (mut snapshots, _) = self.cached(&normalize_ids(coin_ids)).await;
        snapshots.sort_by(|a, b| a.coin_id.cmp(&b.coin_id));
        snapshots
    }

    pub async fn prices_for(&self, coin_ids: &[CoinId]) -> PriceMap {
        self.snapshots_for(coin_ids)
            .await
            .into_iter()
            .map(|s| (s.coin_id, s.usd_price))
            .collect()
    }

    pub async fn price_history(
        &self,
        coin_id: &str,
        range: HistoryRange,
        currency: &str,
    ) -> Result<PriceHistory> {
        let coin_id = coin_id.trim().to_lowercase();
        if coin_id.is_empty() {
            return Err(Error::ValidationError("Coin id is required".to_string()));
        }
        let currency = currency.trim().to_lowercase();
        debug!("Getting {} history for {} in {}", range, coin_id, currency);
        self.source
            .fetch_historical_series(&coin_id, range, &currency)
            .await
    }

    /// Market cap, volume and recent change for each coin, straight from
    /// the provider
    pub async fn market_data(
        &self,
        coin_ids: &[CoinId],
        currency: &str,
    ) -> Result<Vec<MarketData>> {
        let coin_ids = normalize_ids(coin_ids);
        if coin_ids.is_empty() {
            return Err(Error::ValidationError("No coin ids given".to_string()));
        }
        let max = self.source.max_ids_per_call();
        if coin_ids.len() > max {
            return Err(Error::ValidationError(format!(
                "At most {} coin ids per request",
                max
            )));
        }
        let currency = currency.trim().to_lowercase();
        if currency.is_empty() {
            return Err(Error::ValidationError("Currency is required".to_string()));
        }
        self.source.fetch_market_data(&coin_ids, &currency).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<CoinListing>> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LEN {
            return Err(Error::ValidationError(format!(
                "Search query must be at least {} characters",
                MIN_SEARCH_LEN
            )));
        }
        self.source.search_coins(query).await
    }

    pub async fn trending(&self) -> Result<Vec<CoinListing>> {
        self.source.fetch_trending().await
    }

    async fn lookup(&self, coin_ids: &[CoinId]) -> Result<Vec<PriceSnapshot>> {
        let now = Utc::now();
        let (mut snapshots, missing) = self.cached(coin_ids).await;
        let missing = self.not_recently_missed(missing, now).await;

        if !missing.is_empty() {
            debug!("{} of {} prices not cached, fetching", missing.len(), coin_ids.len());
            match self.source.fetch_spot_prices(&missing).await {
                Ok(prices) => {
                    self.remember_misses(&missing, &prices, now).await;
                    snapshots.extend(self.cache.update(&prices, now).await);
                }
                Err(e) if snapshots.is_empty() => return Err(e),
                Err(e) => warn!("Serving cached prices only: {}", e),
            }
        }

        snapshots.sort_by(|a, b| a.coin_id.cmp(&b.coin_id));
        Ok(snapshots)
    }

    async fn not_recently_missed(&self, ids: Vec<CoinId>, now: DateTime<Utc>) -> Vec<CoinId> {
        if ids.is_empty() {
            return ids;
        }
        let misses = self.misses.read().await;
        ids.into_iter()
            .filter(|id| misses.get(id).map_or(true, |at| now - *at >= self.miss_ttl))
            .collect()
    }

    /// Ids that were asked for but came back without a price
    async fn remember_misses(&self, asked: &[CoinId], got: &PriceMap, now: DateTime<Utc>) {
        let mut misses = self.misses.write().await;
        misses.retain(|_, at| now - *at < self.miss_ttl);
        for id in asked {
            if got.contains_key(id) {
                misses.remove(id);
            } else {
                misses.insert(id.clone(), now);
            }
        }
    }

    async fn cached(&self, coin_ids: &[CoinId]) -> (Vec<PriceSnapshot>, Vec<CoinId>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for id in coin_ids {
            match self.cache.get(id).await {
                Some(snapshot) => found.push(snapshot),
                None => missing.push(id.clone()),
            }
        }
        (found, missing)
    }
}

/// Trimmed, lowercased and deduplicated, keeping first-seen order
pub fn normalize_ids(coin_ids: &[CoinId]) -> Vec<CoinId> {
    let mut seen = HashSet::new();
    coin_ids
        .iter()
        .map(|id| id.trim().to_lowercase())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::FakeSource;

    fn service(source: FakeSource) -> (Arc<FakeSource>, Arc<PriceCache>, CoinService) {
        let source = Arc::new(source);
        let cache = Arc::new(PriceCache::new());
        let service = CoinService::new(source.clone(), cache.clone());
        (source, cache, service)
    }

    fn ids(list: &[&str]) -> Vec<CoinId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn cache_hits_skip_upstream() {
        let (source, cache, service) = service(FakeSource::with_prices(&[("bitcoin", 2.0)]));
        let prices: PriceMap = [("bitcoin".to_string(), 1.0)].into_iter().collect();
        cache.update(&prices, Utc::now()).await;

        let got = service.get_prices(&ids(&["bitcoin"])).await.unwrap();
        assert_eq!(got[0].usd_price, 1.0);
        assert_eq!(source.spot_calls(), 0);
    }

    #[tokio::test]
    async fn misses_are_fetched_and_cached() {
        let (source, cache, service) =
            service(FakeSource::with_prices(&[("bitcoin", 2.0), ("ethereum", 3.0)]));

        let got = service
            .get_prices(&ids(&["Bitcoin", "ethereum", "bitcoin"]))
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(source.spot_calls(), 1);
        assert!(cache.get("ethereum").await.is_some());
    }

    #[tokio::test]
    async fn upstream_failure_with_nothing_cached_is_surfaced() {
        let (_, _, service) = service(FakeSource::failing());
        let err = service.get_prices(&ids(&["bitcoin"])).await.unwrap_err();
        assert!(err.is_upstream());
        assert!(service.prices_for(&ids(&["bitcoin"])).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_are_not_asked_for_again_within_the_ttl() {
        let (source, _, service) = service(FakeSource::with_prices(&[("bitcoin", 2.0)]));

        for _ in 0..3 {
            let got = service
                .get_prices(&ids(&["bitcoin", "not-a-coin"]))
                .await
                .unwrap();
            assert_eq!(got.len(), 1);
        }
        // bitcoin is cached after the first call, not-a-coin is a known miss
        assert_eq!(source.spot_calls(), 1);
        assert!(service.get_prices(&ids(&["not-a-coin"])).await.unwrap().is_empty());
        assert_eq!(source.spot_calls(), 1);
    }

    #[tokio::test]
    async fn misses_expire_after_the_ttl() {
        let source = Arc::new(FakeSource::with_prices(&[]));
        let service = CoinService::new(source.clone(), Arc::new(PriceCache::new()))
            .with_miss_ttl(std::time::Duration::ZERO);

        service.get_prices(&ids(&["not-a-coin"])).await.unwrap();
        service.get_prices(&ids(&["not-a-coin"])).await.unwrap();
        assert_eq!(source.spot_calls(), 2);
    }

    #[tokio::test]
    async fn upstream_errors_are_not_remembered_as_misses() {
        let (source, _, service) = service(FakeSource::failing());
        assert!(service.get_prices(&ids(&["bitcoin"])).await.is_err());
        assert!(service.get_prices(&ids(&["bitcoin"])).await.is_err());
        assert_eq!(source.spot_calls(), 2);
    }

    #[tokio::test]
    async fn oversized_request_is_rejected_without_a_call() {
        let mut fake = FakeSource::with_prices(&[]);
        fake.max_ids = Some(2);
        let (source, _, service) = service(fake);

        let err = service
            .get_prices(&ids(&["a", "b", "c"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
        assert_eq!(source.spot_calls(), 0);
    }

    #[tokio::test]
    async fn cached_snapshots_never_call_upstream() {
        let (source, cache, service) = service(FakeSource::with_prices(&[("ethereum", 3.0)]));
        let prices: PriceMap = [("bitcoin".to_string(), 1.0)].into_iter().collect();
        cache.update(&prices, Utc::now()).await;

        let got = service
            .cached_snapshots(&ids(&["Bitcoin", "ethereum"]))
            .await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].coin_id, "bitcoin");
        assert_eq!(source.spot_calls(), 0);
    }

    #[tokio::test]
    async fn market_data_passes_normalized_ids_and_currency() {
        let (_, _, service) = service(FakeSource::with_prices(&[("bitcoin", 2.0)]));

        let got = service
            .market_data(&ids(&[" Bitcoin", "unknown"]), "EUR")
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].coin_id, "bitcoin");
        assert_eq!(got[0].currency, "eur");

        assert!(matches!(
            service.market_data(&[], "usd").await,
            Err(Error::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn short_search_is_rejected() {
        let (_, _, service) = service(FakeSource::with_prices(&[]));
        let err = service.search(" b ").await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
        assert!(service.search("bi").await.is_ok());
    }
}
