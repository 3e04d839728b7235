//! Handling of evicted transaction records.

use store::{InvoiceTransaction, TransactionChange, TransactionStatus};

use crate::context::ImportContext;
use crate::payload::ImportFailure;
use crate::services::{AuditEvent, NotifierExt};

/// What the reaper did with one change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Not a removal in the transaction namespace.
    Ignored,
    /// The import had completed normally.
    Completed,
    /// The record was canceled or already timed out.
    AlreadyTerminal(TransactionStatus),
    /// The import timed out.
    TimedOut { notified: bool, disconnected: bool },
}

/// Turns evictions of unfinished transactions into timeouts.
pub struct ExpiryReaper {
    ctx: ImportContext,
}

impl ExpiryReaper {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }

    /// Handles a change-feed event. Only removals of transaction records
    /// are acted on.
    pub async fn handle_change(&self, change: &TransactionChange) -> ReapOutcome {
        match change.removed_transaction() {
            Some(record) => self.reap(record).await,
            None => ReapOutcome::Ignored,
        }
    }

    /// Inspects the last image of a removed record.
    #[tracing::instrument(skip(self, record), fields(transaction_id = %record.transaction_id, status = %record.status))]
    pub async fn reap(&self, record: &InvoiceTransaction) -> ReapOutcome {
        match record.status {
            TransactionStatus::Processed => {
                tracing::debug!("processed transaction evicted");
                return ReapOutcome::Completed;
            }
            TransactionStatus::Canceled | TransactionStatus::Timeout => {
                return ReapOutcome::AlreadyTerminal(record.status);
            }
            TransactionStatus::Generated
            | TransactionStatus::Received
            | TransactionStatus::NotFound => {}
        }

        metrics::counter!("import_timeouts_total").increment(1);
        tracing::warn!("import timed out");

        let event = AuditEvent::import_failure(ImportFailure::Timeout, &record.transaction_id, None);
        let key = record.transaction_id.as_str();
        let (published, notified, revoked, deleted) = tokio::join!(
            self.ctx.audit.publish(event),
            self.ctx.notifier.send_status(
                &record.transaction_id,
                &record.connection_id,
                TransactionStatus::Timeout,
            ),
            self.ctx.stage.revoke(key),
            self.ctx.stage.delete_object(key),
        );
        if let Err(e) = published {
            tracing::error!(error = %e, "failed to publish timeout audit event");
        }
        if let Err(e) = revoked {
            tracing::error!(error = %e, "failed to revoke upload credential");
        }
        if let Err(e) = deleted {
            tracing::error!(error = %e, "failed to delete staged object");
        }

        let disconnected = self.ctx.notifier.disconnect(&record.connection_id).await;
        if !disconnected {
            tracing::debug!(connection_id = %record.connection_id, "connection already closed");
        }

        ReapOutcome::TimedOut {
            notified,
            disconnected,
        }
    }
}
