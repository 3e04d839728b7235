//! Event dispatch for the import workflow.

use std::sync::Arc;

use common::ConnectionId;
use stage::ObjectCreated;
use store::TransactionChange;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::cancellation::CancellationHandler;
use crate::context::ImportContext;
use crate::frames::ClientAction;
use crate::issuer::UploadSlotIssuer;
use crate::processor::{ImportProcessor, ProcessOutcome};
use crate::reaper::{ExpiryReaper, ReapOutcome};

/// Routes client actions, stage notifications and change-feed events to
/// the import handlers.
///
/// The coordinator holds no per-transaction state. When listening, each
/// inbound event is handled in its own task, so different transactions
/// proceed in parallel and agree only through the store.
pub struct ImportCoordinator {
    ctx: ImportContext,
    issuer: UploadSlotIssuer,
    processor: ImportProcessor,
    cancellation: CancellationHandler,
    reaper: ExpiryReaper,
}

impl ImportCoordinator {
    pub fn new(ctx: ImportContext) -> Self {
        Self {
            issuer: UploadSlotIssuer::new(ctx.clone()),
            processor: ImportProcessor::new(ctx.clone()),
            cancellation: CancellationHandler::new(ctx.clone()),
            reaper: ExpiryReaper::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &ImportContext {
        &self.ctx
    }

    pub fn issuer(&self) -> &UploadSlotIssuer {
        &self.issuer
    }

    pub fn processor(&self) -> &ImportProcessor {
        &self.processor
    }

    pub fn cancellation(&self) -> &CancellationHandler {
        &self.cancellation
    }

    pub fn reaper(&self) -> &ExpiryReaper {
        &self.reaper
    }

    /// Handles one inbound text frame from a client connection. Unknown or
    /// unparseable frames are logged and ignored.
    pub async fn handle_text(&self, connection_id: &ConnectionId, text: &str, request_id: Option<&str>) {
        match ClientAction::parse(text) {
            Some(action) => self.handle_action(connection_id, action, request_id).await,
            None => {
                tracing::warn!(connection_id = %connection_id, "ignoring unrecognized frame");
            }
        }
    }

    pub async fn handle_action(
        &self,
        connection_id: &ConnectionId,
        action: ClientAction,
        request_id: Option<&str>,
    ) {
        tracing::debug!(connection_id = %connection_id, action = action.name(), "client action");
        match action {
            ClientAction::GetImportUrl => {
                if let Err(e) = self.issuer.issue(connection_id, request_id).await {
                    tracing::error!(connection_id = %connection_id, error = %e, "failed to issue upload slot");
                }
            }
            ClientAction::CancelImport { transaction_id } => {
                self.cancellation.cancel(&transaction_id, connection_id).await;
            }
        }
    }

    /// Handles one stage notification. Notifications for other buckets are
    /// ignored and yield `None`.
    pub async fn dispatch_object_created(&self, event: &ObjectCreated) -> Option<ProcessOutcome> {
        if event.bucket != self.ctx.stage.bucket() {
            tracing::debug!(bucket = %event.bucket, "ignoring notification for other bucket");
            return None;
        }
        match self.processor.process(event).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(transaction_id = %event.key, error = %e, "import processing failed");
                None
            }
        }
    }

    pub async fn dispatch_change(&self, change: &TransactionChange) -> ReapOutcome {
        self.reaper.handle_change(change).await
    }

    /// Subscribes to the stage notifications and the transaction change
    /// feed, spawning a task per event. Subscriptions are taken before this
    /// returns.
    pub fn spawn_listeners(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut objects = self.ctx.stage.subscribe();
        let mut changes = self.ctx.transactions.subscribe();

        let this = Arc::clone(self);
        let object_listener = tokio::spawn(async move {
            loop {
                match objects.recv().await {
                    Ok(event) => {
                        let this = Arc::clone(&this);
                        tokio::spawn(async move {
                            this.dispatch_object_created(&event).await;
                        });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "object notification listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("object notification listener stopped");
        });

        let this = Arc::clone(self);
        let change_listener = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        let this = Arc::clone(&this);
                        tokio::spawn(async move {
                            this.dispatch_change(&change).await;
                        });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "change feed listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("change feed listener stopped");
        });

        vec![object_listener, change_listener]
    }
}
