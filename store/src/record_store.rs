use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{Alert, CoinId, Holding, RecordId};

/// Fresh identifier for a holding or alert
pub fn new_record_id() -> RecordId {
    uuid::Uuid::new_v4().to_string()
}

/// Persisted holdings and alerts.
///
/// Records are addressed by user id and record id. Implementations own
/// storage, indexing and migrations; callers only read and update in place.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_holdings(&self, user_id: &str) -> Result<Vec<Holding>, StoreError>;

    async fn get_holding(&self, user_id: &str, id: &str) -> Result<Option<Holding>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the user already holds the coin
    async fn insert_holding(&self, holding: Holding) -> Result<Holding, StoreError>;

    async fn update_holding(&self, holding: &Holding) -> Result<(), StoreError>;

    /// Recomputes the cached valuation fields of the stored holding at
    /// `price` and returns it. Amount, buy price and notes are taken from
    /// the record as stored, never from the caller. `None` when the holding
    /// is gone.
    async fn refresh_holding_valuation(
        &self,
        user_id: &str,
        id: &str,
        price: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<Option<Holding>, StoreError>;

    async fn delete_holding(&self, user_id: &str, id: &str) -> Result<bool, StoreError>;

    async fn list_alerts(&self, user_id: &str) -> Result<Vec<Alert>, StoreError>;

    async fn get_alert(&self, user_id: &str, id: &str) -> Result<Option<Alert>, StoreError>;

    async fn insert_alert(&self, alert: Alert) -> Result<Alert, StoreError>;

    async fn update_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    async fn delete_alert(&self, user_id: &str, id: &str) -> Result<bool, StoreError>;

    /// Active, untriggered alerts on any of the given coins, across users
    async fn pending_alerts_for_coins(&self, coin_ids: &[CoinId]) -> Result<Vec<Alert>, StoreError>;

    /// Conditionally flips an alert to triggered.
    ///
    /// The condition is checked against `price` and the alert as currently
    /// stored. Returns the updated alert only if this call made the
    /// transition; an alert that is missing, paused, already triggered or
    /// whose threshold `price` does not meet yields `None` and is left
    /// unchanged.
    async fn mark_alert_triggered(
        &self,
        alert_id: &str,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError>;
}
