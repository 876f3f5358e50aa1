use crate::broadcaster::Broadcaster;
use crate::evaluator::AlertEvaluator;
use chrono::Utc;
use common::models::{default_coins, CoinId, PriceMap};
use common::{Error, Result};
use connectors::PriceSource;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use store::PriceCache;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// How many trending coins to poll when nobody is subscribed
    pub fallback_count: usize,
    /// Polled when nobody is subscribed and trending is unavailable
    pub fallback_coin_ids: Vec<CoinId>,
    /// Upper bound on every upstream call made by a tick
    pub fetch_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            fallback_count: 10,
            fallback_coin_ids: default_coins().into_iter().map(|c| c.id).collect(),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub requested: usize,
    pub fetched: usize,
    pub failed_chunks: usize,
    pub used_fallback: bool,
}

/// Periodically refreshes the price cache and feeds pushes and alerts
pub struct Poller {
    source: Arc<dyn PriceSource>,
    cache: Arc<PriceCache>,
    broadcaster: Arc<Broadcaster>,
    evaluator: Arc<AlertEvaluator>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(
        source: Arc<dyn PriceSource>,
        cache: Arc<PriceCache>,
        broadcaster: Arc<Broadcaster>,
        evaluator: Arc<AlertEvaluator>,
        config: PollerConfig,
    ) -> Self {
        Self {
            source,
            cache,
            broadcaster,
            evaluator,
            config,
        }
    }

    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let mut coin_ids: Vec<CoinId> = self
            .broadcaster
            .registry()
            .union_of_all_coin_ids()
            .await
            .into_iter()
            .collect();
        if coin_ids.is_empty() {
            report.used_fallback = true;
            coin_ids = self.fallback_coin_ids().await;
            if coin_ids.is_empty() {
                debug!("Nothing to poll");
                return report;
            }
        }
        coin_ids.sort();
        report.requested = coin_ids.len();

        let mut merged = PriceMap::new();
        for chunk in coin_ids.chunks(self.source.max_ids_per_call().max(1)) {
            match self.bounded(self.source.fetch_spot_prices(chunk)).await {
                Ok(prices) => merged.extend(prices),
                Err(e) => {
                    warn!("Price fetch failed for {} coins: {}", chunk.len(), e);
                    report.failed_chunks += 1;
                }
            }
        }

        if merged.is_empty() {
            warn!(
                "Poll fetched no prices ({} chunks failed), retrying next tick",
                report.failed_chunks
            );
            return report;
        }

        let snapshots = self.cache.update(&merged, Utc::now()).await;
        report.fetched = snapshots.len();

        let delivery = self.broadcaster.push_price_update(&snapshots).await;
        let evaluation = self.evaluator.on_price_update(&merged).await;

        debug!(
            "Tick: {} requested, {} fetched, {} pushes ({} dropped), {} alerts fired",
            report.requested,
            report.fetched,
            delivery.delivered,
            delivery.dropped,
            evaluation.triggered.len()
        );
        report
    }

    /// Runs ticks until `cancel` fires. A tick already started is finished.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Price poller started, interval {:?}", self.config.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Price poller stopped");
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn fallback_coin_ids(&self) -> Vec<CoinId> {
        if self.config.fallback_count > 0 {
            match self.bounded(self.source.fetch_trending()).await {
                Ok(trending) if !trending.is_empty() => {
                    return trending
                        .into_iter()
                        .take(self.config.fallback_count)
                        .map(|c| c.id)
                        .collect();
                }
                Ok(_) => debug!("Trending list is empty, using default coins"),
                Err(e) => warn!("Trending fetch failed, using default coins: {}", e),
            }
        }
        self.config.fallback_coin_ids.clone()
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.fetch_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::UpstreamError(format!(
                "request timed out after {:?}",
                self.config.fetch_timeout
            ))),
        }
    }
}
