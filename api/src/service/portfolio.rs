use super::prices::CoinService;
use chrono::Utc;
use common::{
    models::{CoinId, HistoryRange, Holding, HoldingUpdate, NewHolding},
    valuation::{build_chart_series, refresh_holding, valuate, ChartSeries, PortfolioValuation, WeightedSeries},
    Error, Result,
};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use store::{new_record_id, RecordStore};
use tracing::{debug, error, warn};

const CHART_CURRENCY: &str = "usd";

/// Holdings of a user and what they are worth
pub struct PortfolioService {
    store: Arc<dyn RecordStore>,
    coins: Arc<CoinService>,
}

impl PortfolioService {
    pub fn new(store: Arc<dyn RecordStore>, coins: Arc<CoinService>) -> Self {
        Self { store, coins }
    }

    /// Values every holding at current prices. Only the cached valuation
    /// fields are written back, so an edit landing meanwhile is kept; a
    /// failed write is logged and does not fail the request.
    pub async fn portfolio(&self, user_id: &str) -> Result<PortfolioValuation> {
        let listed = self.store.list_holdings(user_id).await?;
        if listed.is_empty() {
            return Ok(PortfolioValuation::default());
        }

        let coin_ids: Vec<CoinId> = listed.iter().map(|h| h.coin_id.clone()).collect();
        let prices = self.coins.prices_for(&coin_ids).await;
        let now = Utc::now();

        let mut holdings = Vec::with_capacity(listed.len());
        for holding in listed {
            let price = prices.get(&holding.coin_id).copied();
            match self
                .store
                .refresh_holding_valuation(user_id, &holding.id, price, now)
                .await
            {
                Ok(Some(fresh)) => holdings.push(fresh),
                // deleted meanwhile
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to persist refreshed holding {}: {}", holding.id, e);
                    holdings.push(holding);
                }
            }
        }

        debug!("Valuated {} holdings for user {}", holdings.len(), user_id);
        Ok(valuate(&holdings, &prices))
    }

    pub async fn add_holding(&self, user_id: &str, new: NewHolding) -> Result<Holding> {
        let now = Utc::now();
        let mut holding = new.into_holding(new_record_id(), user_id.to_string(), now)?;

        let price = self
            .coins
            .prices_for(&[holding.coin_id.clone()])
            .await
            .get(&holding.coin_id)
            .copied();
        refresh_holding(&mut holding, price, now);

        self.store.insert_holding(holding).await.map_err(|e| {
            error!("Failed to add holding for user {}: {}", user_id, e);
            e.into()
        })
    }

    pub async fn update_holding(
        &self,
        user_id: &str,
        holding_id: &str,
        update: HoldingUpdate,
    ) -> Result<Holding> {
        let mut holding = self
            .store
            .get_holding(user_id, holding_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Holding '{}' not found", holding_id)))?;

        update.apply(&mut holding)?;

        let price = self
            .coins
            .prices_for(&[holding.coin_id.clone()])
            .await
            .get(&holding.coin_id)
            .copied();
        refresh_holding(&mut holding, price, Utc::now());

        self.store.update_holding(&holding).await?;
        Ok(holding)
    }

    pub async fn delete_holding(&self, user_id: &str, holding_id: &str) -> Result<()> {
        if self.store.delete_holding(user_id, holding_id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Holding '{}' not found", holding_id)))
        }
    }

    /// Daily portfolio value over `range`. Coins whose history cannot be
    /// fetched are left out of the series.
    pub async fn chart(&self, user_id: &str, range: HistoryRange) -> Result<ChartSeries> {
        let holdings = self.store.list_holdings(user_id).await?;
        if holdings.is_empty() {
            return Ok(vec![]);
        }

        let fetches = holdings.iter().map(|h| async move {
            let history = self
                .coins
                .price_history(&h.coin_id, range, CHART_CURRENCY)
                .await;
            (h, history)
        });

        let mut series: HashMap<CoinId, WeightedSeries> = HashMap::new();
        for (holding, history) in join_all(fetches).await {
            match history {
                Ok(history) => {
                    series.insert(
                        holding.coin_id.clone(),
                        WeightedSeries {
                            amount: holding.amount,
                            points: history.data,
                        },
                    );
                }
                Err(e) => warn!("Leaving {} out of the chart: {}", holding.coin_id, e),
            }
        }

        Ok(build_chart_series(&series))
    }
}
