//! Shared application state.

use std::sync::Arc;

use importer::ImportCoordinator;
use stage::ObjectStage;

use crate::ws::ConnectionManager;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: Arc<ImportCoordinator>,
    pub connections: Arc<ConnectionManager>,
    pub stage: Arc<dyn ObjectStage>,
}
