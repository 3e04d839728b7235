//! Upload-slot issuing.

use common::{ConnectionId, TransactionId};
use store::InvoiceTransaction;

use crate::context::ImportContext;
use crate::error::Result;
use crate::frames::UploadSlot;
use crate::services::NotifierExt;

/// Opens a new import: a transaction record plus a key-scoped upload
/// credential.
pub struct UploadSlotIssuer {
    ctx: ImportContext,
}

impl UploadSlotIssuer {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }

    /// Issues an upload slot for `connection_id` and pushes it to the
    /// connection.
    ///
    /// The credential is created first but only disclosed once the
    /// `GENERATED` record is persisted. A store failure revokes it, returns
    /// an error and sends nothing.
    #[tracing::instrument(skip_all, fields(connection_id = %connection_id, request_id = ?request_id))]
    pub async fn issue(
        &self,
        connection_id: &ConnectionId,
        request_id: Option<&str>,
    ) -> Result<UploadSlot> {
        let settings = &self.ctx.settings;
        let transaction_id = TransactionId::generate();
        let expires = settings.upload_expires_secs;

        let credential = self
            .ctx
            .stage
            .signed_upload_url(transaction_id.as_str(), expires)
            .await?;

        let mut record = InvoiceTransaction::generated(
            transaction_id.clone(),
            connection_id.clone(),
            settings.endpoint.clone(),
            expires,
            settings.transaction_ttl_secs,
        );
        if let Some(request_id) = request_id {
            record = record.with_request_id(request_id);
        }

        if let Err(e) = self.ctx.transactions.create(record).await {
            tracing::error!(transaction_id = %transaction_id, error = %e, "failed to persist transaction");
            if let Err(e) = self.ctx.stage.revoke(transaction_id.as_str()).await {
                tracing::warn!(transaction_id = %transaction_id, error = %e, "failed to revoke undisclosed credential");
            }
            return Err(e.into());
        }

        let slot = UploadSlot {
            url: credential.url,
            expires,
            transaction_id,
        };

        metrics::counter!("import_slots_issued_total").increment(1);
        tracing::info!(transaction_id = %slot.transaction_id, expires, "upload slot issued");

        if !self.ctx.notifier.send_frame(connection_id, &slot).await {
            tracing::warn!(transaction_id = %slot.transaction_id, "upload slot not delivered");
        }

        Ok(slot)
    }
}
