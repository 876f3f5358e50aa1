use crate::{RecordStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    models::{Alert, CoinId, Holding, RecordId},
    valuation::refresh_holding,
};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// In-process [`RecordStore`] keeping every record in memory
#[derive(Default)]
pub struct MemoryStore {
    holdings: RwLock<HashMap<RecordId, Holding>>,
    alerts: RwLock<HashMap<RecordId, Alert>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_holdings(&self, user_id: &str) -> Result<Vec<Holding>, StoreError> {
        let holdings = self.holdings.read().await;
        let mut out: Vec<Holding> = holdings
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn get_holding(&self, user_id: &str, id: &str) -> Result<Option<Holding>, StoreError> {
        Ok(self
            .holdings
            .read()
            .await
            .get(id)
            .filter(|h| h.user_id == user_id)
            .cloned())
    }

    async fn insert_holding(&self, holding: Holding) -> Result<Holding, StoreError> {
        let mut holdings = self.holdings.write().await;

        if holdings
            .values()
            .any(|h| h.user_id == holding.user_id && h.coin_id == holding.coin_id)
        {
            return Err(StoreError::Conflict(format!(
                "Holding for {} already exists",
                holding.coin_id
            )));
        }
        if holdings.contains_key(&holding.id) {
            return Err(StoreError::Conflict(format!("Holding id {} is taken", holding.id)));
        }

        debug!("Inserting holding {} ({})", holding.id, holding.coin_id);
        holdings.insert(holding.id.clone(), holding.clone());
        Ok(holding)
    }

    async fn update_holding(&self, holding: &Holding) -> Result<(), StoreError> {
        let mut holdings = self.holdings.write().await;
        match holdings.get_mut(&holding.id) {
            Some(existing) if existing.user_id == holding.user_id => {
                if existing.coin_id != holding.coin_id {
                    return Err(StoreError::WriteError(
                        "The coin of a holding cannot change".to_string(),
                    ));
                }
                *existing = holding.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("Holding {}", holding.id))),
        }
    }

    async fn refresh_holding_valuation(
        &self,
        user_id: &str,
        id: &str,
        price: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<Option<Holding>, StoreError> {
        let mut holdings = self.holdings.write().await;
        match holdings.get_mut(id) {
            Some(holding) if holding.user_id == user_id => {
                refresh_holding(holding, price, at);
                Ok(Some(holding.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_holding(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut holdings = self.holdings.write().await;
        if holdings.get(id).map_or(false, |h| h.user_id == user_id) {
            holdings.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_alerts(&self, user_id: &str) -> Result<Vec<Alert>, StoreError> {
        let alerts = self.alerts.read().await;
        let mut out: Vec<Alert> = alerts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        // newest first
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn get_alert(&self, user_id: &str, id: &str) -> Result<Option<Alert>, StoreError> {
        Ok(self
            .alerts
            .read()
            .await
            .get(id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn insert_alert(&self, alert: Alert) -> Result<Alert, StoreError> {
        let mut alerts = self.alerts.write().await;
        if alerts.contains_key(&alert.id) {
            return Err(StoreError::Conflict(format!("Alert id {} is taken", alert.id)));
        }
        alerts.insert(alert.id.clone(), alert.clone());
        Ok(alert)
    }

    async fn update_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let mut alerts = self.alerts.write().await;
        match alerts.get_mut(&alert.id) {
            Some(existing) if existing.user_id == alert.user_id => {
                // A stale copy must not undo a trigger that landed meanwhile.
                if existing.triggered && !alert.triggered {
                    return Err(StoreError::Conflict(format!(
                        "Alert {} has already been triggered",
                        alert.id
                    )));
                }
                *existing = alert.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("Alert {}", alert.id))),
        }
    }

    async fn delete_alert(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut alerts = self.alerts.write().await;
        if alerts.get(id).map_or(false, |a| a.user_id == user_id) {
            alerts.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn pending_alerts_for_coins(&self, coin_ids: &[CoinId]) -> Result<Vec<Alert>, StoreError> {
        let wanted: HashSet<&str> = coin_ids.iter().map(String::as_str).collect();
        Ok(self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| a.is_pending() && wanted.contains(a.coin_id.as_str()))
            .cloned()
            .collect())
    }

    async fn mark_alert_triggered(
        &self,
        alert_id: &str,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let mut alerts = self.alerts.write().await;
        match alerts.get_mut(alert_id) {
            Some(alert) if alert.should_trigger(price) => {
                Ok(alert.trigger(at).then(|| alert.clone()))
            }
            _ => Ok(None),
        }
    }
}
