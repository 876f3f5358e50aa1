use serde::{Deserialize, Serialize};

/// Identifier in the price provider's namespace (e.g., "bitcoin").
pub type CoinId = String;

/// Stable identity presented by a caller.
pub type UserId = String;

/// Identifier of a persisted holding or alert.
pub type RecordId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Coin {
    /// Unique identifier for the coin (e.g., "bitcoin", "ethereum")
    pub id: CoinId,
    /// Human-readable name (e.g., "Bitcoin", "Ethereum")
    pub name: String,
    /// Ticker symbol (e.g., "BTC", "ETH")
    pub symbol: String,
}

/// A coin as returned by search and trending lookups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoinListing {
    pub id: CoinId,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub thumb: Option<String>,
}

impl From<CoinListing> for Coin {
    fn from(listing: CoinListing) -> Self {
        Coin {
            id: listing.id,
            name: listing.name,
            symbol: listing.symbol.to_uppercase(),
        }
    }
}

/// Coins used when nobody is subscribed and trending is unavailable.
pub fn default_coins() -> Vec<Coin> {
    vec![
        Coin {
            id: "bitcoin".to_string(),
            name: "Bitcoin".to_string(),
            symbol: "BTC".to_string(),
        },
        Coin {
            id: "ethereum".to_string(),
            name: "Ethereum".to_string(),
            symbol: "ETH".to_string(),
        },
        Coin {
            id: "ripple".to_string(),
            name: "XRP".to_string(),
            symbol: "XRP".to_string(),
        },
        Coin {
            id: "cardano".to_string(),
            name: "Cardano".to_string(),
            symbol: "ADA".to_string(),
        },
        Coin {
            id: "solana".to_string(),
            name: "Solana".to_string(),
            symbol: "SOL".to_string(),
        },
    ]
}
