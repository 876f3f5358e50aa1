use crate::models::{CoinId, RecordId, UserId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_NOTES_LEN: usize = 500;

/// A user's position in one coin.
///
/// `current_price`, `value`, `profit_loss`, `profit_loss_percentage` and
/// `last_updated` are a cache of the last valuation. They are written only by
/// [`crate::valuation::refresh_holding`] and must not be read back as the
/// source of profit/loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: RecordId,
    pub user_id: UserId,
    pub coin_id: CoinId,
    pub symbol: String,
    pub name: String,
    pub amount: f64,
    pub buy_price: f64,
    pub buy_date: DateTime<Utc>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,

    pub current_price: f64,
    pub value: f64,
    pub profit_loss: f64,
    pub profit_loss_percentage: f64,
    pub last_updated: DateTime<Utc>,
}

/// Input for creating a holding
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHolding {
    pub coin_id: CoinId,
    pub symbol: String,
    pub name: String,
    pub amount: f64,
    pub buy_price: f64,
    pub buy_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update of a holding; absent fields are left as they are
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingUpdate {
    pub amount: Option<f64>,
    pub buy_price: Option<f64>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::ValidationError(
            "Amount must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_buy_price(buy_price: f64) -> Result<()> {
    if !buy_price.is_finite() || buy_price < 0.0 {
        return Err(Error::ValidationError(
            "Buy price must be positive".to_string(),
        ));
    }
    Ok(())
}

fn validate_notes(notes: Option<&str>) -> Result<()> {
    if notes.map_or(false, |n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(Error::ValidationError(format!(
            "Notes cannot exceed {} characters",
            MAX_NOTES_LEN
        )));
    }
    Ok(())
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

impl NewHolding {
    pub fn validate(&self) -> Result<()> {
        if self.coin_id.trim().is_empty() {
            return Err(Error::ValidationError("Please provide coin ID".to_string()));
        }
        if self.symbol.trim().is_empty() {
            return Err(Error::ValidationError(
                "Please provide coin symbol".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError("Please provide coin name".to_string()));
        }
        validate_amount(self.amount)?;
        validate_buy_price(self.buy_price)?;
        validate_notes(self.notes.as_deref())
    }

    /// Validates the input and builds the record. Derived fields start at
    /// zero until the first valuation.
    pub fn into_holding(self, id: RecordId, user_id: UserId, now: DateTime<Utc>) -> Result<Holding> {
        self.validate()?;

        Ok(Holding {
            id,
            user_id,
            coin_id: self.coin_id.trim().to_lowercase(),
            symbol: self.symbol.trim().to_uppercase(),
            name: self.name.trim().to_string(),
            amount: self.amount,
            buy_price: self.buy_price,
            buy_date: self.buy_date.unwrap_or(now),
            notes: self.notes,
            tags: clean_tags(self.tags),
            created_at: now,
            current_price: 0.0,
            value: 0.0,
            profit_loss: 0.0,
            profit_loss_percentage: 0.0,
            last_updated: now,
        })
    }
}

impl HoldingUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
        }
        if let Some(buy_price) = self.buy_price {
            validate_buy_price(buy_price)?;
        }
        validate_notes(self.notes.as_deref())
    }

    pub fn apply(self, holding: &mut Holding) -> Result<()> {
        self.validate()?;

        if let Some(amount) = self.amount {
            holding.amount = amount;
        }
        if let Some(buy_price) = self.buy_price {
            holding.buy_price = buy_price;
        }
        if let Some(notes) = self.notes {
            holding.notes = Some(notes);
        }
        if let Some(tags) = self.tags {
            holding.tags = clean_tags(tags);
        }
        Ok(())
    }
}
