//! WebSocket push of state changes
//!
//! Each connection gets the current snapshot on connect and again after
//! every state update. Clients may also ask for it explicitly.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::ApiState;
use crate::state::Snapshot;

/// Incoming WebSocket message from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncoming {
    /// Ask for the current snapshot
    GetState,
    /// Ping to keep connection alive
    Ping,
}

/// Outgoing WebSocket message to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoing {
    /// Full device state
    StateUpdate { state: Snapshot },
    /// Pong response
    Pong,
    /// Error occurred
    Error { code: String, message: String },
}

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut changes = state.publisher.subscribe();

    tracing::debug!("status WebSocket connected");

    // Replies to client requests
    let (tx, mut rx) = mpsc::channel::<WsOutgoing>(16);

    let publisher = state.publisher.clone();
    let mut shutdown = state.shutdown.clone();
    let mut send_task = tokio::spawn(async move {
        let first = WsOutgoing::StateUpdate {
            state: publisher.snapshot(),
        };
        if send(&mut sender, &first).await.is_err() {
            return;
        }

        loop {
            let msg = tokio::select! {
                biased;
                () = shutdown.wait() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    WsOutgoing::StateUpdate { state: publisher.snapshot() }
                }
                Some(reply) = rx.recv() => reply,
            };
            if send(&mut sender, &msg).await.is_err() {
                break;
            }
        }
    });

    let snapshots = state.publisher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = handle_message(&text, || snapshots.snapshot());
                    if tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Message::Ping(data) => {
                    // axum handles pong automatically
                    tracing::trace!(len = data.len(), "received ping");
                }
                Message::Close(_) => {
                    tracing::debug!("status WebSocket closed by client");
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!("status WebSocket disconnected");
}

/// Answer one text frame from the client
fn handle_message(text: &str, snapshot: impl FnOnce() -> Snapshot) -> WsOutgoing {
    match serde_json::from_str::<WsIncoming>(text) {
        Ok(WsIncoming::GetState) => WsOutgoing::StateUpdate { state: snapshot() },
        Ok(WsIncoming::Ping) => WsOutgoing::Pong,
        Err(e) => WsOutgoing::Error {
            code: "invalid_message".to_string(),
            message: e.to_string(),
        },
    }
}

async fn send<S>(sender: &mut S, msg: &WsOutgoing) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = serde_json::to_string(msg).map_err(|e| {
        tracing::error!(error = %e, "failed to encode WebSocket message");
    })?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
