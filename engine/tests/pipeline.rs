use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{
    Alert, AlertCondition, CoinId, CoinListing, HistoryRange, Holding, MarketData, NewAlert,
    PriceHistory, PriceMap,
};
use common::{Error, Result};
use connectors::PriceSource;
use engine::{
    AlertEvaluator, Broadcaster, Poller, PollerConfig, ServerEvent, SubscriptionRegistry,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use store::{MemoryStore, PriceCache, RecordStore, StoreError};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeSource {
    prices: PriceMap,
    /// A chunk containing any of these ids fails as a whole
    failing: HashSet<CoinId>,
    trending: Option<Vec<CoinId>>,
    max_ids: usize,
    delay: Option<Duration>,
    spot_calls: Mutex<Vec<Vec<CoinId>>>,
}

impl FakeSource {
    fn with_prices(pairs: &[(&str, f64)]) -> Self {
        Self {
            prices: pairs.iter().map(|(id, p)| (id.to_string(), *p)).collect(),
            max_ids: 250,
            ..Default::default()
        }
    }

    fn requested(&self) -> Vec<CoinId> {
        let mut all: Vec<CoinId> = self.spot_calls.lock().unwrap().concat();
        all.sort();
        all
    }
}

#[async_trait]
impl PriceSource for FakeSource {
    async fn fetch_spot_prices(&self, coin_ids: &[CoinId]) -> Result<PriceMap> {
        self.spot_calls.lock().unwrap().push(coin_ids.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if coin_ids.iter().any(|id| self.failing.contains(id)) {
            return Err(Error::UpstreamError("HTTP 500".into()));
        }
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
        Ok(PriceHistory {
            coin_id: coin_id.to_string(),
            currency: currency.to_string(),
            range,
            data: vec![],
        })
    }

    async fn fetch_market_data(
        &self,
        _coin_ids: &[CoinId],
        _currency: &str,
    ) -> Result<Vec<MarketData>> {
        Ok(vec![])
    }

    async fn search_coins(&self, _query: &str) -> Result<Vec<CoinListing>> {
        Ok(vec![])
    }

    async fn fetch_trending(&self) -> Result<Vec<CoinListing>> {
        match &self.trending {
            Some(ids) => Ok(ids
                .iter()
                .map(|id| CoinListing {
                    id: id.clone(),
                    name: id.clone(),
                    symbol: id.to_uppercase(),
                    market_cap_rank: None,
                    thumb: None,
                })
                .collect()),
            None => Err(Error::UpstreamError("rate limited".into())),
        }
    }

    fn max_ids_per_call(&self) -> usize {
        self.max_ids
    }
}

struct Pipeline {
    source: Arc<FakeSource>,
    store: Arc<MemoryStore>,
    cache: Arc<PriceCache>,
    registry: Arc<SubscriptionRegistry>,
    broadcaster: Arc<Broadcaster>,
    evaluator: Arc<AlertEvaluator>,
    poller: Arc<Poller>,
}

fn pipeline(source: FakeSource, queue_capacity: usize, config: PollerConfig) -> Pipeline {
    let source = Arc::new(source);
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(PriceCache::new());
    let registry = Arc::new(SubscriptionRegistry::new());
    let broadcaster = Arc::new(Broadcaster::new(registry.clone(), queue_capacity));
    let evaluator = Arc::new(AlertEvaluator::new(store.clone(), broadcaster.clone()));
    let poller = Arc::new(Poller::new(
        source.clone(),
        cache.clone(),
        broadcaster.clone(),
        evaluator.clone(),
        config,
    ));
    Pipeline {
        source,
        store,
        cache,
        registry,
        broadcaster,
        evaluator,
        poller,
    }
}

fn ids(list: &[&str]) -> Vec<CoinId> {
    list.iter().map(|s| s.to_string()).collect()
}

async fn add_alert(store: &MemoryStore, user_id: &str, price: f64) -> String {
    let alert = NewAlert {
        coin_id: "bitcoin".into(),
        coin_symbol: "BTC".into(),
        coin_name: "Bitcoin".into(),
        alert_price: price,
        condition: AlertCondition::Above,
    }
    .into_alert(store::new_record_id(), user_id.into(), Utc::now())
    .unwrap();
    store.insert_alert(alert).await.unwrap().id
}

#[tokio::test]
async fn idle_poller_fetches_trending_coins() {
    let mut source = FakeSource::with_prices(&[("pepe", 0.1), ("bonk", 0.2)]);
    source.trending = Some(ids(&["pepe", "bonk", "wif"]));
    let config = PollerConfig {
        fallback_count: 2,
        ..Default::default()
    };
    let p = pipeline(source, 8, config);

    let report = p.poller.tick().await;

    assert!(report.used_fallback);
    assert_eq!(report.requested, 2);
    assert_eq!(p.source.requested(), ids(&["bonk", "pepe"]));
    assert_eq!(p.cache.len().await, 2);
}

#[tokio::test]
async fn idle_poller_falls_back_to_default_coins() {
    let source = FakeSource::with_prices(&[("bitcoin", 1.0)]);
    let config = PollerConfig {
        fallback_coin_ids: ids(&["bitcoin", "ethereum"]),
        ..Default::default()
    };
    let p = pipeline(source, 8, config);

    let report = p.poller.tick().await;

    assert!(report.used_fallback);
    assert_eq!(p.source.requested(), ids(&["bitcoin", "ethereum"]));
    assert_eq!(report.fetched, 1);
}

#[tokio::test]
async fn empty_fallback_ends_the_tick() {
    let config = PollerConfig {
        fallback_count: 0,
        fallback_coin_ids: vec![],
        ..Default::default()
    };
    let p = pipeline(FakeSource::with_prices(&[]), 8, config);

    let report = p.poller.tick().await;

    assert_eq!(report.requested, 0);
    assert!(p.source.requested().is_empty());
}

#[tokio::test]
async fn failing_chunk_does_not_stop_the_others() {
    let mut source = FakeSource::with_prices(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
    source.max_ids = 2;
    source.failing = ["c".to_string()].into_iter().collect();
    let p = pipeline(source, 8, PollerConfig::default());

    let mut rx = p.broadcaster.attach("c1").await;
    p.registry.subscribe("c1", None, ids(&["a", "b", "c", "d"])).await;

    let report = p.poller.tick().await;

    assert_eq!(report.failed_chunks, 1);
    assert_eq!(report.fetched, 2);
    assert!(p.cache.get("a").await.is_some());
    assert!(p.cache.get("b").await.is_some());
    assert!(p.cache.get("c").await.is_none());

    match rx.try_recv().unwrap() {
        ServerEvent::PriceUpdate { prices } => {
            let got: Vec<&String> = prices.keys().collect();
            assert_eq!(got, vec!["a", "b"]);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn hung_upstream_is_bounded_by_the_fetch_timeout() {
    let mut source = FakeSource::with_prices(&[("bitcoin", 1.0)]);
    source.delay = Some(Duration::from_secs(5));
    let config = PollerConfig {
        fetch_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let p = pipeline(source, 8, config);
    p.registry.subscribe("c1", None, ids(&["bitcoin"])).await;

    let report = tokio::time::timeout(Duration::from_secs(1), p.poller.tick())
        .await
        .expect("tick should not hang");

    assert_eq!(report.failed_chunks, 1);
    assert!(p.cache.is_empty().await);
}

#[tokio::test]
async fn unsubscribed_connection_is_not_pushed() {
    let source = FakeSource::with_prices(&[("bitcoin", 1.0), ("ethereum", 2.0)]);
    let p = pipeline(source, 8, PollerConfig::default());

    let mut rx1 = p.broadcaster.attach("c1").await;
    let mut rx2 = p.broadcaster.attach("c2").await;
    p.registry.subscribe("c1", None, ids(&["bitcoin"])).await;
    p.registry.subscribe("c2", None, ids(&["bitcoin"])).await;
    p.registry.unsubscribe("c1").await;

    assert!(!p.registry.connections_interested_in("bitcoin").await.contains("c1"));

    p.poller.tick().await;

    assert!(rx1.try_recv().is_err());
    assert!(rx2.try_recv().is_ok());
}

#[tokio::test]
async fn full_queue_never_blocks_the_poller() {
    let source = FakeSource::with_prices(&[("bitcoin", 1.0)]);
    let p = pipeline(source, 1, PollerConfig::default());

    // never drained
    let mut rx = p.broadcaster.attach("c1").await;
    p.registry.subscribe("c1", None, ids(&["bitcoin"])).await;

    for _ in 0..5 {
        tokio::time::timeout(Duration::from_secs(1), p.poller.tick())
            .await
            .expect("tick blocked on a slow client");
    }

    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_evaluations_trigger_once() {
    let p = pipeline(FakeSource::with_prices(&[]), 64, PollerConfig::default());
    let mut rx = p.broadcaster.attach("c1").await;
    p.registry.identify("c1", "u1".into()).await;
    let alert_id = add_alert(&p.store, "u1", 100.0).await;

    let prices: PriceMap = [("bitcoin".to_string(), 150.0)].into_iter().collect();
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let evaluator = p.evaluator.clone();
            let prices = prices.clone();
            tokio::spawn(async move { evaluator.on_price_update(&prices).await })
        })
        .collect();

    let mut fired = 0;
    for task in tasks {
        fired += task.await.unwrap().triggered.len();
    }
    assert_eq!(fired, 1);

    match rx.try_recv().unwrap() {
        ServerEvent::Alert { alert } => assert_eq!(alert.alert_id, alert_id),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn alert_for_offline_user_is_dropped() {
    let source = FakeSource::with_prices(&[("bitcoin", 150.0)]);
    let p = pipeline(source, 8, PollerConfig::default());
    let alert_id = add_alert(&p.store, "u1", 100.0).await;

    // someone else keeps bitcoin polled
    p.registry.subscribe("other", None, ids(&["bitcoin"])).await;
    p.poller.tick().await;

    let stored = p.store.get_alert("u1", &alert_id).await.unwrap().unwrap();
    assert!(stored.triggered);

    // connecting later does not replay the event
    let mut rx = p.broadcaster.attach("c1").await;
    p.registry.identify("c1", "u1".into()).await;
    p.poller.tick().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn cancelled_poller_stops() {
    let source = FakeSource::with_prices(&[("bitcoin", 1.0)]);
    let config = PollerConfig {
        interval: Duration::from_millis(10),
        ..Default::default()
    };
    let p = pipeline(source, 8, config);
    p.registry.subscribe("c1", None, ids(&["bitcoin"])).await;

    let cancel = CancellationToken::new();
    let handle = p.poller.clone().spawn(cancel.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("poller did not stop")
        .unwrap();
    assert!(p.cache.get("bitcoin").await.is_some());
}

/// Raises every loaded alert's threshold right after the evaluator read it,
/// the way a user's edit landing mid-evaluation would.
struct EditDuringEvaluation {
    inner: MemoryStore,
    raise_to: f64,
}

#[async_trait]
impl RecordStore for EditDuringEvaluation {
    async fn list_holdings(&self, user_id: &str) -> std::result::Result<Vec<Holding>, StoreError> {
        self.inner.list_holdings(user_id).await
    }

    async fn get_holding(
        &self,
        user_id: &str,
        id: &str,
    ) -> std::result::Result<Option<Holding>, StoreError> {
        self.inner.get_holding(user_id, id).await
    }

    async fn insert_holding(&self, holding: Holding) -> std::result::Result<Holding, StoreError> {
        self.inner.insert_holding(holding).await
    }

    async fn update_holding(&self, holding: &Holding) -> std::result::Result<(), StoreError> {
        self.inner.update_holding(holding).await
    }

    async fn refresh_holding_valuation(
        &self,
        user_id: &str,
        id: &str,
        price: Option<f64>,
        at: DateTime<Utc>,
    ) -> std::result::Result<Option<Holding>, StoreError> {
        self.inner.refresh_holding_valuation(user_id, id, price, at).await
    }

    async fn delete_holding(&self, user_id: &str, id: &str) -> std::result::Result<bool, StoreError> {
        self.inner.delete_holding(user_id, id).await
    }

    async fn list_alerts(&self, user_id: &str) -> std::result::Result<Vec<Alert>, StoreError> {
        self.inner.list_alerts(user_id).await
    }

    async fn get_alert(&self, user_id: &str, id: &str) -> std::result::Result<Option<Alert>, StoreError> {
        self.inner.get_alert(user_id, id).await
    }

    async fn insert_alert(&self, alert: Alert) -> std::result::Result<Alert, StoreError> {
        self.inner.insert_alert(alert).await
    }

    async fn update_alert(&self, alert: &Alert) -> std::result::Result<(), StoreError> {
        self.inner.update_alert(alert).await
    }

    async fn delete_alert(&self, user_id: &str, id: &str) -> std::result::Result<bool, StoreError> {
        self.inner.delete_alert(user_id, id).await
    }

    async fn pending_alerts_for_coins(
        &self,
        coin_ids: &[CoinId],
    ) -> std::result::Result<Vec<Alert>, StoreError> {
        let loaded = self.inner.pending_alerts_for_coins(coin_ids).await?;
        for alert in &loaded {
            let mut edited = alert.clone();
            edited.alert_price = self.raise_to;
            self.inner.update_alert(&edited).await?;
        }
        Ok(loaded)
    }

    async fn mark_alert_triggered(
        &self,
        alert_id: &str,
        price: f64,
        at: DateTime<Utc>,
    ) -> std::result::Result<Option<Alert>, StoreError> {
        self.inner.mark_alert_triggered(alert_id, price, at).await
    }
}

#[tokio::test]
async fn alert_edited_during_evaluation_uses_the_new_threshold() {
    let store = Arc::new(EditDuringEvaluation {
        inner: MemoryStore::new(),
        raise_to: 200.0,
    });
    let alert_id = add_alert(&store.inner, "u1", 100.0).await;

    let registry = Arc::new(SubscriptionRegistry::new());
    let broadcaster = Arc::new(Broadcaster::new(registry, 8));
    let mut rx = broadcaster.attach("c1").await;
    broadcaster.registry().identify("c1", "u1".into()).await;
    let evaluator = AlertEvaluator::new(store.clone(), broadcaster.clone());

    let prices: PriceMap = [("bitcoin".to_string(), 150.0)].into_iter().collect();
    let report = evaluator.on_price_update(&prices).await;

    assert!(report.triggered.is_empty());
    let stored = store.inner.get_alert("u1", &alert_id).await.unwrap().unwrap();
    assert_eq!(stored.alert_price, 200.0);
    assert!(!stored.triggered);
    assert!(rx.try_recv().is_err());
}
