use chrono::{DateTime, Utc};
use common::models::{AlertNotification, CoinId, PriceSnapshot, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages a push client may send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach a user to the connection so alert events reach it
    #[serde(rename_all = "camelCase")]
    Identify { user_id: UserId },
    /// Replace the connection's coin interest set
    #[serde(rename_all = "camelCase")]
    Subscribe {
        coin_ids: Vec<CoinId>,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    Unsubscribe,
}

/// Price of one coin inside a `price_update` event
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub usd: f64,
    pub observed_at: DateTime<Utc>,
}

/// Events pushed to a connection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    PriceUpdate { prices: BTreeMap<CoinId, PriceQuote> },
    Alert { alert: AlertNotification },
    #[serde(rename_all = "camelCase")]
    Subscribed { coin_ids: Vec<CoinId> },
    Error { message: String },
}

impl ServerEvent {
    pub fn price_update<'a>(snapshots: impl IntoIterator<Item = &'a PriceSnapshot>) -> Self {
        let prices = snapshots
            .into_iter()
            .map(|s| {
                (
                    s.coin_id.clone(),
                    PriceQuote {
                        usd: s.usd_price,
                        observed_at: s.observed_at,
                    },
                )
            })
            .collect();
        ServerEvent::PriceUpdate { prices }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}
