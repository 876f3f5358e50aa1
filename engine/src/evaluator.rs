use crate::broadcaster::Broadcaster;
use crate::locks::KeyedLocks;
use chrono::Utc;
use common::models::{AlertNotification, CoinId, PriceMap};
use std::sync::Arc;
use store::RecordStore;
use tracing::{debug, info, warn};

/// Outcome of one evaluation pass
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    /// Pending alerts looked at
    pub checked: usize,
    pub triggered: Vec<AlertNotification>,
    pub failures: usize,
}

/// Fires threshold alerts against fresh prices, each at most once
pub struct AlertEvaluator {
    store: Arc<dyn RecordStore>,
    broadcaster: Arc<Broadcaster>,
    locks: KeyedLocks,
}

impl AlertEvaluator {
    pub fn new(store: Arc<dyn RecordStore>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            store,
            broadcaster,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn on_price_update(&self, prices: &PriceMap) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        if prices.is_empty() {
            return report;
        }

        let coin_ids: Vec<CoinId> = prices.keys().cloned().collect();
        let pending = match self.store.pending_alerts_for_coins(&coin_ids).await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!("Failed to load pending alerts: {}", e);
                report.failures += 1;
                return report;
            }
        };

        for alert in pending {
            report.checked += 1;
            let Some(&price) = prices.get(&alert.coin_id) else {
                continue;
            };
            if !alert.should_trigger(price) {
                continue;
            }

            // The store rechecks the condition: the alert may have been
            // edited since it was loaded.
            let _guard = self.locks.lock(&alert.id).await;
            let fired = match self
                .store
                .mark_alert_triggered(&alert.id, price, Utc::now())
                .await
            {
                Ok(Some(fired)) => fired,
                Ok(None) => {
                    debug!("Alert {} was already handled or changed", alert.id);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to mark alert {} as triggered: {}", alert.id, e);
                    report.failures += 1;
                    continue;
                }
            };

            let notification = fired.notification(price);
            info!(
                "Alert {} triggered: {} {} {} at {}",
                fired.id, fired.coin_symbol, fired.condition, fired.alert_price, price
            );
            self.broadcaster
                .push_alert_event(&fired.user_id, &notification)
                .await;
            report.triggered.push(notification);
        }

        report
    }
}
