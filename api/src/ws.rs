use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use engine::{ClientMessage, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::service::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(25);

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    let mut outbound = state.broadcaster.attach(&connection_id).await;
    let (mut sink, mut stream) = socket.split();
    info!("Push connection {} opened", connection_id);

    // Drain the outbound queue and keep the client alive
    let mut writer = tokio::spawn(async move {
        let mut ping = interval(PING_INTERVAL);
        ping.tick().await;

        loop {
            tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode push event: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if sink.send(Message::Ping(b"ping".to_vec())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!("Writer for {} stopped", connection_id);
                break;
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => on_client_text(&state, &connection_id, &text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Read error on {}: {}", connection_id, e);
                    break;
                }
            }
        }
    }

    state.broadcaster.registry().unsubscribe(&connection_id).await;
    state.broadcaster.detach(&connection_id).await;
    writer.abort();
    info!("Push connection {} closed", connection_id);
}

async fn on_client_text(state: &AppState, connection_id: &str, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Bad message on {}: {}", connection_id, e);
            state
                .broadcaster
                .send_to(connection_id, ServerEvent::error(format!("Invalid message: {}", e)))
                .await;
            return;
        }
    };

    let registry = state.broadcaster.registry();
    match message {
        ClientMessage::Identify { user_id } => {
            registry.identify(connection_id, user_id).await;
        }
        ClientMessage::Subscribe { coin_ids, user_id } => {
            let requested: HashSet<String> = coin_ids
                .iter()
                .map(|id| id.trim().to_lowercase())
                .filter(|id| !id.is_empty())
                .collect();
            let subscription = registry.subscribe(connection_id, user_id, coin_ids).await;
            if subscription.coin_ids.len() < requested.len() {
                state
                    .broadcaster
                    .send_to(
                        connection_id,
                        ServerEvent::error(format!(
                            "Subscribed to the first {} of {} coins",
                            subscription.coin_ids.len(),
                            requested.len()
                        )),
                    )
                    .await;
            }
            let mut coin_ids: Vec<_> = subscription.coin_ids.into_iter().collect();
            coin_ids.sort();

            state
                .broadcaster
                .send_to(
                    connection_id,
                    ServerEvent::Subscribed {
                        coin_ids: coin_ids.clone(),
                    },
                )
                .await;

            // Whatever is cached goes out now; the next poll fills the rest
            let snapshots = state.coins.cached_snapshots(&coin_ids).await;
            if !snapshots.is_empty() {
                state
                    .broadcaster
                    .send_to(connection_id, ServerEvent::price_update(&snapshots))
                    .await;
            }
        }
        ClientMessage::Unsubscribe => {
            registry.unsubscribe(connection_id).await;
        }
    }
}
