//! WebSocket connection manager
//!
//! Registry of live client connections, keyed by the connection id handed
//! to the import workflow. Uses DashMap for concurrent access.

use common::ConnectionId;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Instruction for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// WebSocket sender channel type
pub type WsSender = mpsc::UnboundedSender<Outbound>;

/// Thread-safe map of connection id to the connection's writer channel.
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, WsSender>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and returns its id.
    pub fn add_connection(&self, tx: WsSender) -> ConnectionId {
        let connection_id = ConnectionId::generate();
        self.connections.insert(connection_id.clone(), tx);
        metrics::gauge!("ws_connections_active").set(self.connections.len() as f64);
        tracing::info!(
            connection_id = %connection_id,
            total_connections = self.connections.len(),
            "WebSocket connection added"
        );
        connection_id
    }

    /// Called when a connection is closed.
    pub fn remove_connection(&self, connection_id: &ConnectionId) {
        if self.connections.remove(connection_id).is_some() {
            metrics::gauge!("ws_connections_active").set(self.connections.len() as f64);
            tracing::info!(
                connection_id = %connection_id,
                remaining_connections = self.connections.len(),
                "WebSocket connection removed"
            );
        }
    }

    /// Returns true if the connection is registered and its writer is alive.
    pub fn is_live(&self, connection_id: &ConnectionId) -> bool {
        self.connections
            .get(connection_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Queues a text frame. Returns false if the connection is gone.
    pub fn send_text(&self, connection_id: &ConnectionId, text: &str) -> bool {
        self.push(connection_id, Outbound::Text(text.to_string()))
    }

    /// Asks the writer to close the socket. The entry is dropped immediately.
    pub fn close(&self, connection_id: &ConnectionId) -> bool {
        let sent = self.push(connection_id, Outbound::Close);
        self.remove_connection(connection_id);
        sent
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn push(&self, connection_id: &ConnectionId, message: Outbound) -> bool {
        let Some(tx) = self.connections.get(connection_id) else {
            return false;
        };
        if tx.send(message).is_err() {
            drop(tx);
            tracing::warn!(connection_id = %connection_id, "Failed to send - client disconnected");
            self.remove_connection(connection_id);
            return false;
        }
        true
    }
}
