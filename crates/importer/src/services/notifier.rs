//! Push-channel notifier trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ConnectionId, TransactionId};
use serde::Serialize;
use store::TransactionStatus;
use tokio::sync::RwLock;

use crate::frames::StatusFrame;

/// Best-effort delivery to a client connection.
///
/// Connection ids are weak references: the connection may have gone away at
/// any point. Both operations verify liveness first and report a gone
/// connection as `false` rather than an error.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a text frame. Returns true if it was handed to a live connection.
    async fn send(&self, connection_id: &ConnectionId, data: &str) -> bool;

    /// Forcibly closes the connection. Returns true if it was live.
    async fn disconnect(&self, connection_id: &ConnectionId) -> bool;
}

/// Frame helpers on top of [`Notifier`].
#[async_trait]
pub trait NotifierExt: Notifier {
    /// Serializes `frame` and sends it.
    async fn send_frame<T>(&self, connection_id: &ConnectionId, frame: &T) -> bool
    where
        T: Serialize + Sync,
    {
        match serde_json::to_string(frame) {
            Ok(data) => self.send(connection_id, &data).await,
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "failed to serialize frame");
                false
            }
        }
    }

    /// Sends a `{transactionId, status}` frame.
    async fn send_status(
        &self,
        transaction_id: &TransactionId,
        connection_id: &ConnectionId,
        status: TransactionStatus,
    ) -> bool {
        let frame = StatusFrame::new(transaction_id.clone(), status);
        let sent = self.send_frame(connection_id, &frame).await;
        if !sent {
            tracing::warn!(
                transaction_id = %transaction_id,
                connection_id = %connection_id,
                status = %status,
                "status notification not delivered"
            );
        }
        sent
    }
}

impl<T: Notifier + ?Sized> NotifierExt for T {}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    live: HashSet<ConnectionId>,
    sent: Vec<(ConnectionId, String)>,
    disconnected: Vec<ConnectionId>,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live connection.
    pub async fn connect(&self, connection_id: &ConnectionId) {
        self.state.write().await.live.insert(connection_id.clone());
    }

    /// Drops a connection without recording a forced close.
    pub async fn drop_connection(&self, connection_id: &ConnectionId) {
        self.state.write().await.live.remove(connection_id);
    }

    pub async fn is_live(&self, connection_id: &ConnectionId) -> bool {
        self.state.read().await.live.contains(connection_id)
    }

    /// Returns every frame delivered to the connection, in order, as JSON.
    pub async fn frames_for(&self, connection_id: &ConnectionId) -> Vec<serde_json::Value> {
        self.state
            .read()
            .await
            .sent
            .iter()
            .filter(|(id, _)| id == connection_id)
            .filter_map(|(_, data)| serde_json::from_str(data).ok())
            .collect()
    }

    /// Returns the `status` field of every status frame delivered to the
    /// connection.
    pub async fn statuses_for(&self, connection_id: &ConnectionId) -> Vec<String> {
        self.frames_for(connection_id)
            .await
            .into_iter()
            .filter_map(|frame| frame.get("status")?.as_str().map(str::to_string))
            .collect()
    }

    /// Returns the connections closed through [`Notifier::disconnect`].
    pub async fn disconnected(&self) -> Vec<ConnectionId> {
        self.state.read().await.disconnected.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.state.read().await.sent.len()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, connection_id: &ConnectionId, data: &str) -> bool {
        let mut state = self.state.write().await;
        if !state.live.contains(connection_id) {
            metrics::counter!("notifier_send_failures_total").increment(1);
            tracing::debug!(connection_id = %connection_id, "connection is gone");
            return false;
        }
        state.sent.push((connection_id.clone(), data.to_string()));
        true
    }

    async fn disconnect(&self, connection_id: &ConnectionId) -> bool {
        let mut state = self.state.write().await;
        if !state.live.remove(connection_id) {
            tracing::debug!(connection_id = %connection_id, "connection already gone");
            return false;
        }
        state.disconnected.push(connection_id.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_to_live_connection() {
        let notifier = InMemoryNotifier::new();
        let conn = ConnectionId::from("c1");
        notifier.connect(&conn).await;

        assert!(notifier.send(&conn, r#"{"hello":1}"#).await);
        assert_eq!(notifier.frames_for(&conn).await[0]["hello"], 1);
    }

    #[tokio::test]
    async fn send_to_gone_connection_returns_false() {
        let notifier = InMemoryNotifier::new();
        let conn = ConnectionId::from("c1");

        assert!(!notifier.send(&conn, "{}").await);
        assert_eq!(notifier.sent_count().await, 0);
    }

    #[tokio::test]
    async fn send_status_serializes_frame() {
        let notifier = InMemoryNotifier::new();
        let conn = ConnectionId::from("c1");
        notifier.connect(&conn).await;

        assert!(
            notifier
                .send_status(&TransactionId::from("t1"), &conn, TransactionStatus::Received)
                .await
        );
        let frames = notifier.frames_for(&conn).await;
        assert_eq!(frames[0]["transactionId"], "t1");
        assert_eq!(notifier.statuses_for(&conn).await, vec!["RECEIVED"]);
    }

    #[tokio::test]
    async fn disconnect_only_live_connections() {
        let notifier = InMemoryNotifier::new();
        let conn = ConnectionId::from("c1");
        notifier.connect(&conn).await;

        assert!(notifier.disconnect(&conn).await);
        assert!(!notifier.is_live(&conn).await);
        assert!(!notifier.disconnect(&conn).await);
        assert_eq!(notifier.disconnected().await, vec![conn]);
    }

    #[tokio::test]
    async fn works_through_trait_object() {
        let notifier = InMemoryNotifier::new();
        let conn = ConnectionId::from("c1");
        notifier.connect(&conn).await;

        let dynamic: Arc<dyn Notifier> = Arc::new(notifier.clone());
        assert!(
            dynamic
                .send_status(&TransactionId::from("t1"), &conn, TransactionStatus::Timeout)
                .await
        );
        assert_eq!(notifier.statuses_for(&conn).await, vec!["TIMEOUT"]);
    }
}
