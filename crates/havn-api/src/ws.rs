//! `WebSocket` observer sessions.
//!
//! Clients connect to `GET /ws` and receive every `spot_update` envelope
//! published by any instance, as text frames, in hub order. The session
//! registers with the hub on upgrade and unregisters when the client
//! closes, the socket errors, or the hub drops its channel (slow consumer
//! or shutdown). In the last case the client is sent a close frame.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use havn_hub::ObserverRegistration;
use havn_types::UserId;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::auth::USER_ID_HEADER;
use crate::state::AppState;

/// Upgrade an HTTP request to an observer session.
///
/// Identity is optional: anonymous observers receive the same stream.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_spots(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<UserId>().ok());
    ws.on_upgrade(move |socket| observe(socket, state, user))
}

/// Drive one observer session until either side goes away.
async fn observe(mut socket: WebSocket, state: Arc<AppState>, user: Option<UserId>) {
    let ObserverRegistration { id, mut receiver } = match state.hub.register().await {
        Ok(registration) => registration,
        Err(e) => {
            warn!(error = %e, "Hub unavailable, refusing observer");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    debug!(observer = %id, ?user, "Observer connected");

    let mut heartbeat = tokio::time::interval(state.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            payload = receiver.recv() => {
                let Some(payload) = payload else {
                    debug!(observer = %id, "Hub closed observer channel");
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                if socket.send(Message::Text(String::from(&*payload).into())).await.is_err() {
                    debug!(observer = %id, "Observer disconnected (send failed)");
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    debug!(observer = %id, "Observer disconnected (ping failed)");
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(observer = %id, "Observer disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(observer = %id, "Observer disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(observer = %id, "WebSocket error: {e}");
                        break;
                    }
                    // Client text, binary and pong frames carry nothing we act on.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Removing an observer the hub already dropped is a no-op.
    if let Err(e) = state.hub.unregister(id).await {
        debug!(observer = %id, error = %e, "Unregister after hub shutdown");
    }
}
