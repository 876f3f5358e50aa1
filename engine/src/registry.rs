use common::models::{CoinId, UserId};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Identifier of one live push connection
pub type ConnectionId = String;

/// What a connection is listening to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    pub user_id: Option<UserId>,
    pub coin_ids: HashSet<CoinId>,
}

#[derive(Default)]
struct Indexes {
    by_connection: HashMap<ConnectionId, Subscription>,
    by_coin: HashMap<CoinId, HashSet<ConnectionId>>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
}

impl Indexes {
    fn remove(&mut self, connection_id: &str) -> Option<Subscription> {
        let old = self.by_connection.remove(connection_id)?;
        for coin_id in &old.coin_ids {
            remove_from(&mut self.by_coin, coin_id, connection_id);
        }
        if let Some(user_id) = &old.user_id {
            remove_from(&mut self.by_user, user_id, connection_id);
        }
        Some(old)
    }

    fn insert(&mut self, connection_id: &str, subscription: Subscription) {
        for coin_id in &subscription.coin_ids {
            self.by_coin
                .entry(coin_id.clone())
                .or_default()
                .insert(connection_id.to_string());
        }
        if let Some(user_id) = &subscription.user_id {
            self.by_user
                .entry(user_id.clone())
                .or_default()
                .insert(connection_id.to_string());
        }
        self.by_connection
            .insert(connection_id.to_string(), subscription);
    }
}

fn remove_from(index: &mut HashMap<String, HashSet<ConnectionId>>, key: &str, connection_id: &str) {
    if let Some(set) = index.get_mut(key) {
        set.remove(connection_id);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

/// Which connection wants which coins, and which user owns which connections
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<Indexes>,
    max_coins: Option<usize>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry accepting at most `max_coins` coins per connection
    pub fn with_max_coins(max_coins: usize) -> Self {
        Self {
            max_coins: Some(max_coins.max(1)),
            ..Default::default()
        }
    }

    pub fn max_coins(&self) -> Option<usize> {
        self.max_coins
    }

    /// Replaces the connection's coin set. A `None` user keeps whichever
    /// user the connection was already identified as. Coins past the cap
    /// are dropped, keeping the ones listed first.
    pub async fn subscribe(
        &self,
        connection_id: &str,
        user_id: Option<UserId>,
        coin_ids: impl IntoIterator<Item = CoinId>,
    ) -> Subscription {
        let mut seen = HashSet::new();
        let mut ordered: Vec<CoinId> = coin_ids
            .into_iter()
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();
        if let Some(max) = self.max_coins.filter(|max| ordered.len() > *max) {
            warn!(
                "Connection {} asked for {} coins, keeping the first {}",
                connection_id,
                ordered.len(),
                max
            );
            ordered.truncate(max);
        }
        let coin_ids: HashSet<CoinId> = ordered.into_iter().collect();

        let mut inner = self.inner.write().await;
        let previous_user = inner.remove(connection_id).and_then(|s| s.user_id);
        let subscription = Subscription {
            user_id: user_id.or(previous_user),
            coin_ids,
        };
        inner.insert(connection_id, subscription.clone());

        debug!(
            "Connection {} subscribed to {} coins",
            connection_id,
            subscription.coin_ids.len()
        );
        subscription
    }

    /// Attaches a user to the connection, keeping its coins
    pub async fn identify(&self, connection_id: &str, user_id: UserId) {
        let mut inner = self.inner.write().await;
        let mut subscription = inner.remove(connection_id).unwrap_or_default();
        subscription.user_id = Some(user_id);
        inner.insert(connection_id, subscription);
    }

    /// Forgets the connection entirely
    pub async fn unsubscribe(&self, connection_id: &str) -> bool {
        self.inner.write().await.remove(connection_id).is_some()
    }

    pub async fn union_of_all_coin_ids(&self) -> HashSet<CoinId> {
        self.inner.read().await.by_coin.keys().cloned().collect()
    }

    pub async fn connections_interested_in(&self, coin_id: &str) -> HashSet<ConnectionId> {
        self.inner
            .read()
            .await
            .by_coin
            .get(coin_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn connections_for_user(&self, user_id: &str) -> HashSet<ConnectionId> {
        self.inner
            .read()
            .await
            .by_user
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn subscription(&self, connection_id: &str) -> Option<Subscription> {
        self.inner.read().await.by_connection.get(connection_id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.by_connection.len()
    }
}
