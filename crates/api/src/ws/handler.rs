//! WebSocket handler for client connections
//!
//! Handles WebSocket upgrade, connection lifecycle, and dispatch of client
//! actions to the import coordinator.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::connection::Outbound;
use crate::state::AppState;

/// WebSocket upgrade handler
///
/// Endpoint: GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let connection_id = state.connections.add_connection(tx);

    // Forward queued frames to the socket until the channel or socket closes.
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Each text frame is one client action, handled in its own task.
    let coordinator = state.coordinator.clone();
    let reader_connection_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let coordinator = coordinator.clone();
                    let connection_id = reader_connection_id.clone();
                    let request_id = Uuid::new_v4().to_string();
                    tokio::spawn(async move {
                        coordinator
                            .handle_text(&connection_id, text.as_str(), Some(&request_id))
                            .await;
                    });
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.connections.remove_connection(&connection_id);
}
