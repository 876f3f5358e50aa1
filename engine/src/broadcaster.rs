use crate::events::ServerEvent;
use crate::registry::{ConnectionId, SubscriptionRegistry};
use common::models::{AlertNotification, PriceSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Outcome of one push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

impl DeliveryReport {
    fn record(&mut self, outcome: Delivery) {
        match outcome {
            Delivery::Sent => self.delivered += 1,
            Delivery::Full => self.dropped += 1,
            Delivery::Gone => {}
        }
    }
}

enum Delivery {
    Sent,
    Full,
    Gone,
}

/// Fans events out to connections through bounded per-connection queues.
/// Never waits on a client: a full queue loses the newest event.
pub struct Broadcaster {
    registry: Arc<SubscriptionRegistry>,
    outboxes: RwLock<HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>,
    capacity: usize,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriptionRegistry>, capacity: usize) -> Self {
        Self {
            registry,
            outboxes: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Opens the outbound queue of a new connection
    pub async fn attach(&self, connection_id: &str) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.outboxes
            .write()
            .await
            .insert(connection_id.to_string(), tx);
        debug!("Connection {} attached", connection_id);
        rx
    }

    pub async fn detach(&self, connection_id: &str) {
        if self.outboxes.write().await.remove(connection_id).is_some() {
            debug!("Connection {} detached", connection_id);
        }
    }

    /// Sends each interested connection the part of `snapshots` it subscribed to
    pub async fn push_price_update(&self, snapshots: &[PriceSnapshot]) -> DeliveryReport {
        let mut per_connection: HashMap<ConnectionId, Vec<&PriceSnapshot>> = HashMap::new();
        for snapshot in snapshots {
            for connection_id in self
                .registry
                .connections_interested_in(&snapshot.coin_id)
                .await
            {
                per_connection.entry(connection_id).or_default().push(snapshot);
            }
        }

        let mut report = DeliveryReport::default();
        if per_connection.is_empty() {
            return report;
        }

        let outboxes = self.outboxes.read().await;
        for (connection_id, subset) in per_connection {
            if let Some(tx) = outboxes.get(&connection_id) {
                let event = ServerEvent::price_update(subset);
                report.record(deliver(tx, &connection_id, event));
            }
        }
        report
    }

    /// Sends an alert to every live connection of the user; dropped if none
    pub async fn push_alert_event(
        &self,
        user_id: &str,
        notification: &AlertNotification,
    ) -> DeliveryReport {
        let connections = self.registry.connections_for_user(user_id).await;
        let mut report = DeliveryReport::default();
        if connections.is_empty() {
            debug!(
                "No live connection for user {}, alert {} not pushed",
                user_id, notification.alert_id
            );
            return report;
        }

        let outboxes = self.outboxes.read().await;
        for connection_id in connections {
            if let Some(tx) = outboxes.get(&connection_id) {
                let event = ServerEvent::Alert {
                    alert: notification.clone(),
                };
                report.record(deliver(tx, &connection_id, event));
            }
        }
        report
    }

    pub async fn send_to(&self, connection_id: &str, event: ServerEvent) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if let Some(tx) = self.outboxes.read().await.get(connection_id) {
            report.record(deliver(tx, connection_id, event));
        }
        report
    }

    pub async fn connection_count(&self) -> usize {
        self.outboxes.read().await.len()
    }
}

fn deliver(tx: &mpsc::Sender<ServerEvent>, connection_id: &str, event: ServerEvent) -> Delivery {
    match tx.try_send(event) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => {
            warn!("Outbound queue full for connection {}, dropping event", connection_id);
            Delivery::Full
        }
        Err(TrySendError::Closed(_)) => Delivery::Gone,
    }
}
