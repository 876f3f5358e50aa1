use chrono::Utc;
use common::{
    models::{Alert, AlertUpdate, NewAlert},
    Error, Result,
};
use std::sync::Arc;
use store::{new_record_id, RecordStore};
use tracing::{debug, info};

/// User-managed price alerts. Firing them is the evaluator's job.
pub struct AlertService {
    store: Arc<dyn RecordStore>,
}

impl AlertService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn list_alerts(&self, user_id: &str) -> Result<Vec<Alert>> {
        Ok(self.store.list_alerts(user_id).await?)
    }

    pub async fn create_alert(&self, user_id: &str, new: NewAlert) -> Result<Alert> {
        let alert = new.into_alert(new_record_id(), user_id.to_string(), Utc::now())?;
        let alert = self.store.insert_alert(alert).await?;
        info!(
            "Alert {} created: {} {} {}",
            alert.id, alert.coin_id, alert.condition, alert.alert_price
        );
        Ok(alert)
    }

    /// Changes price, condition or activity of an alert that has not fired
    pub async fn update_alert(&self, user_id: &str, alert_id: &str, update: AlertUpdate) -> Result<Alert> {
        let mut alert = self.find(user_id, alert_id).await?;
        update.apply(&mut alert)?;
        self.store.update_alert(&alert).await?;
        Ok(alert)
    }

    pub async fn toggle_alert(&self, user_id: &str, alert_id: &str, is_active: bool) -> Result<Alert> {
        let mut alert = self.find(user_id, alert_id).await?;
        alert.set_active(is_active)?;
        self.store.update_alert(&alert).await?;
        debug!("Alert {} active: {}", alert.id, is_active);
        Ok(alert)
    }

    pub async fn delete_alert(&self, user_id: &str, alert_id: &str) -> Result<()> {
        if self.store.delete_alert(user_id, alert_id).await? {
            Ok(())
        } else {
            Err(not_found(alert_id))
        }
    }

    async fn find(&self, user_id: &str, alert_id: &str) -> Result<Alert> {
        self.store
            .get_alert(user_id, alert_id)
            .await?
            .ok_or_else(|| not_found(alert_id))
    }
}

fn not_found(alert_id: &str) -> Error {
    Error::NotFound(format!("Alert '{}' not found", alert_id))
}
