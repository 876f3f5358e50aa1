use crate::models::{CoinId, RecordId, UserId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction a price has to cross for an alert to fire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Above,
    Below,
}

impl AlertCondition {
    /// Both boundaries are inclusive: a threshold equal to the current price
    /// is met in either direction.
    pub fn is_met(self, price: f64, threshold: f64) -> bool {
        match self {
            AlertCondition::Above => price >= threshold,
            AlertCondition::Below => price <= threshold,
        }
    }
}

impl std::fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertCondition::Above => write!(f, "above"),
            AlertCondition::Below => write!(f, "below"),
        }
    }
}

/// Threshold alert.
///
/// `triggered` only ever moves from false to true, and `triggered_at` is set
/// together with it. A triggered alert is inert; it can only be deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: RecordId,
    pub user_id: UserId,
    pub coin_id: CoinId,
    pub coin_symbol: String,
    pub coin_name: String,
    pub alert_price: f64,
    pub condition: AlertCondition,
    pub is_active: bool,
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Active and not yet triggered.
    pub fn is_pending(&self) -> bool {
        self.is_active && !self.triggered
    }

    pub fn should_trigger(&self, price: f64) -> bool {
        self.is_pending()
            && price.is_finite()
            && price > 0.0
            && self.condition.is_met(price, self.alert_price)
    }

    /// Flips the alert to triggered. Returns false, leaving the alert
    /// untouched, when it is paused or already triggered.
    pub fn trigger(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.triggered = true;
        self.triggered_at = Some(at);
        true
    }

    pub fn set_active(&mut self, is_active: bool) -> Result<()> {
        if self.triggered {
            return Err(Error::ValidationError(
                "Alert has already been triggered".to_string(),
            ));
        }
        self.is_active = is_active;
        Ok(())
    }

    pub fn notification(&self, current_price: f64) -> AlertNotification {
        AlertNotification {
            alert_id: self.id.clone(),
            coin_id: self.coin_id.clone(),
            coin_symbol: self.coin_symbol.clone(),
            coin_name: self.coin_name.clone(),
            alert_price: self.alert_price,
            current_price,
            condition: self.condition,
            triggered_at: self.triggered_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Input for creating an alert
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub coin_id: CoinId,
    pub coin_symbol: String,
    pub coin_name: String,
    pub alert_price: f64,
    pub condition: AlertCondition,
}

fn validate_alert_price(alert_price: f64) -> Result<()> {
    if !alert_price.is_finite() || alert_price <= 0.0 {
        return Err(Error::ValidationError(
            "Alert price must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

impl NewAlert {
    pub fn validate(&self) -> Result<()> {
        if self.coin_id.trim().is_empty() {
            return Err(Error::ValidationError("Please provide coin ID".to_string()));
        }
        if self.coin_symbol.trim().is_empty() {
            return Err(Error::ValidationError(
                "Please provide coin symbol".to_string(),
            ));
        }
        validate_alert_price(self.alert_price)
    }

    pub fn into_alert(self, id: RecordId, user_id: UserId, now: DateTime<Utc>) -> Result<Alert> {
        self.validate()?;

        Ok(Alert {
            id,
            user_id,
            coin_id: self.coin_id.trim().to_lowercase(),
            coin_symbol: self.coin_symbol.trim().to_uppercase(),
            coin_name: self.coin_name.trim().to_string(),
            alert_price: self.alert_price,
            condition: self.condition,
            is_active: true,
            triggered: false,
            triggered_at: None,
            created_at: now,
        })
    }
}

/// Partial update of an alert that has not triggered yet
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertUpdate {
    pub alert_price: Option<f64>,
    pub condition: Option<AlertCondition>,
    pub is_active: Option<bool>,
}

impl AlertUpdate {
    pub fn apply(self, alert: &mut Alert) -> Result<()> {
        if alert.triggered {
            return Err(Error::ValidationError(
                "Alert has already been triggered".to_string(),
            ));
        }
        if let Some(alert_price) = self.alert_price {
            validate_alert_price(alert_price)?;
            alert.alert_price = alert_price;
        }
        if let Some(condition) = self.condition {
            alert.condition = condition;
        }
        if let Some(is_active) = self.is_active {
            alert.is_active = is_active;
        }
        Ok(())
    }
}

/// Payload pushed to a user's connections when one of their alerts fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub alert_id: RecordId,
    pub coin_id: CoinId,
    pub coin_symbol: String,
    pub coin_name: String,
    pub alert_price: f64,
    pub current_price: f64,
    pub condition: AlertCondition,
    pub triggered_at: DateTime<Utc>,
}
