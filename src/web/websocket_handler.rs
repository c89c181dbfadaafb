use axum::{
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::web::AppState;
use crate::web::models::{AllStatusesPush, WsMessage};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn send_json(socket: &mut WebSocket, message: &WsMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(Utf8Bytes::from(json))).await.is_ok(),
        Err(e) => {
            warn!(event = message.event_name(), error = %e, "Failed to serialize websocket message");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, app_state: Arc<AppState>) {
    info!("WebSocket subscriber connected");

    // Subscribe before the snapshot so no update falls between the two.
    let mut rx = app_state.broadcaster.subscribe();

    let outcomes = app_state.store.all();
    if !outcomes.is_empty() {
        let snapshot = WsMessage::AllStatuses(AllStatusesPush::from_outcomes(&outcomes));
        if !send_json(&mut socket, &snapshot).await {
            warn!("Error sending initial snapshot. Closing connection.");
            return;
        }
        debug!(count = outcomes.len(), "Sent initial snapshot");
    }

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Ok(message) => {
                        if !send_json(&mut socket, &message).await {
                            debug!("Error sending update. Breaking loop.");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket subscriber lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            Some(Ok(msg)) = socket.next() => {
                match msg {
                    Message::Text(t) => {
                        if t.as_str() == "ping"
                            && socket.send(Message::Text(Utf8Bytes::from("pong"))).await.is_err()
                        {
                            break;
                        }
                    }
                    Message::Ping(p) => {
                        if socket.send(Message::Pong(p)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    Message::Binary(_) | Message::Pong(_) => {}
                }
            }
            // Client disconnected without sending a close message
            else => break,
        }
    }
    info!("WebSocket subscriber disconnected");
}
