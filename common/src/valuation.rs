//! Portfolio valuation.
//!
//! Every profit/loss number the service reports comes out of this module:
//! holdings are valued against a price map on each request, and the derived
//! fields stored on a [`Holding`] are refreshed only through
//! [`refresh_holding`].

use crate::models::{CoinId, Holding, PriceHistoryPoint, PriceMap, RecordId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Valuation of a single holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingValuation {
    pub holding_id: RecordId,
    pub coin_id: CoinId,
    pub symbol: String,
    pub name: String,
    pub amount: f64,
    pub buy_price: f64,
    pub current_price: f64,
    pub cost: f64,
    pub value: f64,
    pub profit_loss: f64,
    pub profit_loss_percentage: f64,
    /// Share of the portfolio's total value
    pub allocation_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioValuation {
    pub total_value: f64,
    pub total_cost: f64,
    pub total_profit_loss: f64,
    pub total_profit_loss_percentage: f64,
    pub holdings: Vec<HoldingValuation>,
}

/// Historical series of one coin weighted by the amount held
#[derive(Debug, Clone)]
pub struct WeightedSeries {
    pub amount: f64,
    pub points: Vec<PriceHistoryPoint>,
}

/// One day of the portfolio value chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub date: NaiveDate,
    /// UTC midnight of `date`
    pub timestamp: DateTime<Utc>,
    pub total_value: f64,
}

pub type ChartSeries = Vec<ChartPoint>;

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// Values `holdings` against `prices`. Coins missing from the map are valued
/// at zero.
pub fn valuate(holdings: &[Holding], prices: &PriceMap) -> PortfolioValuation {
    let mut valuation = PortfolioValuation::default();

    for holding in holdings {
        let current_price = prices.get(&holding.coin_id).copied().unwrap_or(0.0);
        let cost = holding.amount * holding.buy_price;
        let value = holding.amount * current_price;
        let profit_loss = value - cost;

        valuation.total_cost += cost;
        valuation.total_value += value;
        valuation.total_profit_loss += profit_loss;

        valuation.holdings.push(HoldingValuation {
            holding_id: holding.id.clone(),
            coin_id: holding.coin_id.clone(),
            symbol: holding.symbol.clone(),
            name: holding.name.clone(),
            amount: holding.amount,
            buy_price: holding.buy_price,
            current_price,
            cost,
            value,
            profit_loss,
            profit_loss_percentage: percentage(profit_loss, cost),
            allocation_percentage: 0.0,
        });
    }

    let total_value = valuation.total_value;
    for h in &mut valuation.holdings {
        h.allocation_percentage = percentage(h.value, total_value);
    }
    valuation.total_profit_loss_percentage =
        percentage(valuation.total_profit_loss, valuation.total_cost);

    valuation
}

/// Rewrites the cached valuation fields of `holding`.
///
/// With no known price the previously cached price is kept, so a missed
/// upstream lookup does not zero out the record.
pub fn refresh_holding(holding: &mut Holding, price: Option<f64>, now: DateTime<Utc>) {
    if let Some(price) = price.filter(|p| p.is_finite() && *p >= 0.0) {
        holding.current_price = price;
    }

    let cost = holding.amount * holding.buy_price;
    holding.value = holding.amount * holding.current_price;
    holding.profit_loss = holding.value - cost;
    holding.profit_loss_percentage = percentage(holding.profit_loss, cost);
    holding.last_updated = now;
}

/// Merges per-coin series into one portfolio value per UTC calendar day,
/// ascending. A coin contributes only to the days it has points for.
///
/// Short ranges come back with hourly points; each coin is valued at its
/// last point of the day, the closing price.
pub fn build_chart_series(series: &HashMap<CoinId, WeightedSeries>) -> ChartSeries {
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for weighted in series.values() {
        let mut closes: HashMap<NaiveDate, &PriceHistoryPoint> = HashMap::new();
        for point in weighted.points.iter().filter(|p| p.price.is_finite()) {
            let close = closes.entry(point.timestamp.date_naive()).or_insert(point);
            if point.timestamp >= close.timestamp {
                *close = point;
            }
        }

        for (date, close) in closes {
            *buckets.entry(date).or_insert(0.0) += weighted.amount * close.price;
        }
    }

    buckets
        .into_iter()
        .map(|(date, total_value)| ChartPoint {
            date,
            timestamp: date.and_time(chrono::NaiveTime::MIN).and_utc(),
            total_value,
        })
        .collect()
}
