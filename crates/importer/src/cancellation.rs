//! Client-initiated cancellation.

use common::{ConnectionId, TransactionId};
use store::{StoreError, TransactionStatus};

use crate::context::ImportContext;
use crate::services::NotifierExt;

/// Cancels imports that have not been uploaded yet.
pub struct CancellationHandler {
    ctx: ImportContext,
}

impl CancellationHandler {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }

    /// Cancels `transaction_id` on behalf of `requester`.
    ///
    /// Only a `GENERATED` transaction is canceled; its upload credential is
    /// revoked and the record's own connection is told `CANCELED`. Otherwise the requester is told the
    /// actual status, `NOT_FOUND` for a missing record or a failed read.
    /// Returns the status that was reported.
    #[tracing::instrument(skip_all, fields(transaction_id = %transaction_id, connection_id = %requester))]
    pub async fn cancel(
        &self,
        transaction_id: &TransactionId,
        requester: &ConnectionId,
    ) -> TransactionStatus {
        let record = match self.ctx.transactions.get(transaction_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return self.reply(transaction_id, requester, TransactionStatus::NotFound).await,
            Err(e) => {
                tracing::error!(error = %e, "failed to read transaction");
                return self.reply(transaction_id, requester, TransactionStatus::NotFound).await;
            }
        };

        if !record.status.can_cancel() {
            tracing::info!(status = %record.status, "cannot cancel an ongoing import");
            return self.reply(transaction_id, requester, record.status).await;
        }

        match self
            .ctx
            .transactions
            .compare_and_set(
                transaction_id,
                TransactionStatus::Generated,
                TransactionStatus::Canceled,
            )
            .await
        {
            Ok(_) => {
                metrics::counter!("import_canceled_total").increment(1);
                tracing::info!("import canceled");
                let (revoked, _) = tokio::join!(
                    self.ctx.stage.revoke(transaction_id.as_str()),
                    self.ctx.notifier.send_status(
                        transaction_id,
                        &record.connection_id,
                        TransactionStatus::Canceled,
                    ),
                );
                if let Err(e) = revoked {
                    tracing::error!(error = %e, "failed to revoke upload credential");
                }
                TransactionStatus::Canceled
            }
            Err(StoreError::StatusConflict { actual, .. }) => {
                tracing::info!(status = %actual, "transaction moved before cancel");
                self.reply(transaction_id, requester, actual).await
            }
            Err(StoreError::NotFound(_)) => {
                self.reply(transaction_id, requester, TransactionStatus::NotFound).await
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to cancel transaction");
                self.reply(transaction_id, requester, record.status).await
            }
        }
    }

    async fn reply(
        &self,
        transaction_id: &TransactionId,
        requester: &ConnectionId,
        status: TransactionStatus,
    ) -> TransactionStatus {
        self.ctx
            .notifier
            .send_status(transaction_id, requester, status)
            .await;
        status
    }
}
