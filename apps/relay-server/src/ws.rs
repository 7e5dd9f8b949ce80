//! WebSocket fan-out: one connection per participant, frames are
//! `SyncEvent` JSON. Incoming events land in the session log and the hub;
//! hub deliveries flow back out to every participant except the origin.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use quick_assist::SyncEvent;
use records::ParticipantId;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    code: String,
    participant: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let participant = query
        .participant
        .and_then(|id| id.parse::<Uuid>().ok())
        .map(ParticipantId)
        .unwrap_or_else(ParticipantId::new);

    ws.on_upgrade(move |socket| handle_socket(socket, state, query.code, participant))
}

async fn handle_socket(socket: WebSocket, state: AppState, code: String, participant: ParticipantId) {
    let session = match state.registry.lookup_code(&code) {
        Ok(session) => session,
        Err(err) => {
            warn!(%code, %err, "rejecting websocket for unknown code");
            let mut socket = socket;
            let body = serde_json::json!({ "error": err.to_string() }).to_string();
            let _ = socket.send(Message::Text(body)).await;
            return;
        }
    };

    info!(
        "participant {} connected to session {} ({})",
        participant, session.id, session.share_code
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Subscribe to the session topic before catching up, so nothing
    // published in between is missed.
    let mut broadcast_rx = state.hub.subscribe(session.id).await;

    // Create a channel for sending messages to the WebSocket
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Catch up from the retained log; replay is harmless since consumers
    // apply whole-buffer replacement.
    for event in state.store.sync_events_after(session.id, None) {
        if event.origin == participant {
            continue;
        }
        if let Ok(json) = serde_json::to_string(&event) {
            if ws_tx.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
    }

    // Forward hub deliveries to this participant, excluding its own events.
    let broadcast_task = tokio::spawn({
        let tx = tx.clone();
        async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        if event.origin == participant {
                            continue;
                        }
                        let Ok(json) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if tx.send(Message::Text(json)).is_err() {
                            debug!("websocket consumer dropped");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "relay subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    });

    // Spawn task to send messages to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_tx.send(msg).await {
                debug!("failed to send to websocket: {}", e);
                break;
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<SyncEvent>(&text) {
                    Ok(event) if event.session_id == session.id => {
                        state
                            .store
                            .append_sync_event(event.clone(), state.config.event_log_cap);
                        let sender = state.hub.sender(session.id).await;
                        let _ = sender.send(event);
                    }
                    Ok(event) => {
                        warn!(
                            "event for session {} on a {} connection dropped",
                            event.session_id, session.id
                        );
                    }
                    Err(e) => {
                        error!("undecodable frame from {}: {}", participant, e);
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = tx.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                info!("websocket closed by client");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("websocket error: {}", e);
                break;
            }
        }
    }

    // Cleanup
    broadcast_task.abort();
    send_task.abort();
    info!(
        "participant {} disconnected from session {}",
        participant, session.id
    );
}
