mod alert;
mod coin;
mod holding;
mod price;

pub use alert::{Alert, AlertCondition, AlertNotification, AlertUpdate, NewAlert};
pub use coin::{default_coins, Coin, CoinId, CoinListing, RecordId, UserId};
pub use holding::{Holding, HoldingUpdate, NewHolding, MAX_NOTES_LEN};
pub use price::{
    HistoryRange, MarketData, PriceHistory, PriceHistoryPoint, PriceMap, PriceSnapshot,
};
