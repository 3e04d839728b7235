//! Processing of uploaded objects.

use common::TransactionId;
use stage::ObjectCreated;
use store::{InvoiceTransaction, StoreError, TransactionStatus};

use crate::context::ImportContext;
use crate::error::Result;
use crate::payload::{ImportFailure, InvoicePayload};
use crate::services::{AuditEvent, NotifierExt};

/// What the processor did with one object notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// No transaction record exists for the key.
    TransactionMissing,
    /// The record was not `GENERATED`; its current status was re-sent.
    Redelivered(TransactionStatus),
    /// The payload was rejected and audited. The record stays `RECEIVED`.
    Rejected(ImportFailure),
    /// An infrastructure step failed. The record stays `RECEIVED`.
    Stalled,
    /// The invoice was committed.
    Processed,
}

/// Reacts to object-creation notifications from the stage.
pub struct ImportProcessor {
    ctx: ImportContext,
}

impl ImportProcessor {
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx }
    }

    /// Drives one uploaded object through validation and commit.
    ///
    /// Only a failed read of the transaction record is returned as an
    /// error; every later failure is logged and reported as an outcome.
    #[tracing::instrument(skip(self, event), fields(transaction_id = %event.key))]
    pub async fn process(&self, event: &ObjectCreated) -> Result<ProcessOutcome> {
        let start = std::time::Instant::now();
        let transaction_id = TransactionId::new(event.key.clone());

        let Some(record) = self.ctx.transactions.get(&transaction_id).await? else {
            tracing::error!("no transaction for uploaded object");
            self.discard_object(&event.key).await;
            return Ok(ProcessOutcome::TransactionMissing);
        };

        if record.status != TransactionStatus::Generated {
            tracing::info!(status = %record.status, "object already handled, re-sending status");
            if record.status.is_abandoned() {
                self.discard_object(&event.key).await;
            }
            self.notify(&record, record.status).await;
            return Ok(ProcessOutcome::Redelivered(record.status));
        }

        match self
            .ctx
            .transactions
            .compare_and_set(
                &transaction_id,
                TransactionStatus::Generated,
                TransactionStatus::Received,
            )
            .await
        {
            Ok(_) => {
                self.notify(&record, TransactionStatus::Received).await;
            }
            Err(StoreError::StatusConflict { actual, .. }) => {
                tracing::info!(status = %actual, "transaction moved concurrently");
                if actual.is_abandoned() {
                    self.discard_object(&event.key).await;
                }
                self.notify(&record, actual).await;
                return Ok(ProcessOutcome::Redelivered(actual));
            }
            Err(StoreError::NotFound(_)) => {
                tracing::error!("transaction removed before it was received");
                self.discard_object(&event.key).await;
                return Ok(ProcessOutcome::TransactionMissing);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to mark transaction received");
                self.notify(&record, TransactionStatus::Received).await;
            }
        }

        let bytes = match self.ctx.stage.get_object(&event.key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch uploaded object");
                return Ok(ProcessOutcome::Stalled);
            }
        };

        let payload = match InvoicePayload::parse(&bytes) {
            Ok(payload) => payload,
            Err(e) => {
                let failure = e.failure();
                metrics::counter!("import_payload_rejected_total", "reason" => failure.as_str())
                    .increment(1);
                tracing::warn!(error_detail = %failure, error = %e, "invoice payload rejected");
                let event =
                    AuditEvent::import_failure(failure, &transaction_id, Some(e.to_string()));
                if let Err(e) = self.ctx.audit.publish(event).await {
                    tracing::error!(error = %e, "failed to publish audit event");
                }
                return Ok(ProcessOutcome::Rejected(failure));
            }
        };

        let invoice = payload.into_invoice(transaction_id.clone());
        let invoice_key = invoice.key();
        if let Err(e) = self.ctx.invoices.put(invoice).await {
            tracing::error!(invoice = %invoice_key, error = %e, "failed to commit invoice");
            return Ok(ProcessOutcome::Stalled);
        }

        let (deleted, completed, _) = tokio::join!(
            self.ctx.stage.delete_object(&event.key),
            self.ctx.transactions.compare_and_set(
                &transaction_id,
                TransactionStatus::Received,
                TransactionStatus::Processed,
            ),
            self.notify(&record, TransactionStatus::Processed),
        );
        if let Err(e) = deleted {
            tracing::error!(error = %e, "failed to delete staged object");
        }
        if let Err(e) = completed {
            tracing::error!(error = %e, "failed to mark transaction processed");
        }

        metrics::counter!("import_processed_total").increment(1);
        metrics::histogram!("import_processing_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        tracing::info!(invoice = %invoice_key, "invoice imported");

        Ok(ProcessOutcome::Processed)
    }

    /// Deletes an object that no live transaction will ever consume.
    async fn discard_object(&self, key: &str) {
        match self.ctx.stage.delete_object(key).await {
            Ok(true) => tracing::debug!("orphaned object deleted"),
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "failed to delete orphaned object"),
        }
    }

    async fn notify(&self, record: &InvoiceTransaction, status: TransactionStatus) -> bool {
        self.ctx
            .notifier
            .send_status(&record.transaction_id, &record.connection_id, status)
            .await
    }
}
