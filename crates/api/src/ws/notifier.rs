use std::sync::Arc;

use async_trait::async_trait;
use common::ConnectionId;
use importer::Notifier;

use super::connection::ConnectionManager;

/// [`Notifier`] backed by the live WebSocket connections of this process.
#[derive(Clone)]
pub struct WsNotifier {
    connections: Arc<ConnectionManager>,
}

impl WsNotifier {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl Notifier for WsNotifier {
    async fn send(&self, connection_id: &ConnectionId, data: &str) -> bool {
        if !self.connections.is_live(connection_id) {
            metrics::counter!("notifier_send_failures_total").increment(1);
            tracing::info!(connection_id = %connection_id, "connection is gone");
            return false;
        }
        let sent = self.connections.send_text(connection_id, data);
        if !sent {
            metrics::counter!("notifier_send_failures_total").increment(1);
        }
        sent
    }

    async fn disconnect(&self, connection_id: &ConnectionId) -> bool {
        if !self.connections.is_live(connection_id) {
            tracing::info!(connection_id = %connection_id, "connection already gone");
            return false;
        }
        self.connections.close(connection_id)
    }
}
