use chrono::{DateTime, Duration, Utc};
use common::models::{CoinId, PriceMap, PriceSnapshot};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Last known USD price per coin.
///
/// Each [`PriceCache::update`] batch is applied under a single write guard,
/// so readers observe a batch entirely or not at all.
#[derive(Default)]
pub struct PriceCache {
    entries: RwLock<HashMap<CoinId, PriceSnapshot>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, coin_id: &str) -> Option<PriceSnapshot> {
        self.entries.read().await.get(coin_id).cloned()
    }

    /// Prices of the requested coins that the cache knows about
    pub async fn get_many(&self, coin_ids: &[CoinId]) -> PriceMap {
        let entries = self.entries.read().await;
        coin_ids
            .iter()
            .filter_map(|id| entries.get(id).map(|s| (id.clone(), s.usd_price)))
            .collect()
    }

    /// Overwrites the given coins and returns the snapshots written.
    /// Coins absent from `prices` are left untouched; unusable prices are
    /// ignored.
    pub async fn update(&self, prices: &PriceMap, observed_at: DateTime<Utc>) -> Vec<PriceSnapshot> {
        let written: Vec<PriceSnapshot> = prices
            .iter()
            .filter(|(_, price)| price.is_finite() && **price >= 0.0)
            .map(|(coin_id, price)| PriceSnapshot {
                coin_id: coin_id.clone(),
                usd_price: *price,
                observed_at,
            })
            .collect();

        {
            let mut entries = self.entries.write().await;
            for snapshot in &written {
                entries.insert(snapshot.coin_id.clone(), snapshot.clone());
            }
        }

        debug!("Price cache updated: {} coins", written.len());
        written
    }

    pub async fn snapshot(&self) -> Vec<PriceSnapshot> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// True when the coin is unknown or was last observed more than `max_age`
    /// before `now`.
    pub async fn is_stale(&self, coin_id: &str, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.entries.read().await.get(coin_id) {
            Some(snapshot) => now - snapshot.observed_at > max_age,
            None => true,
        }
    }
}
