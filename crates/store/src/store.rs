use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::{
    Invoice, InvoiceTransaction, Result, StoreError, TransactionChange, TransactionId,
    TransactionStatus,
};

/// Capacity of the in-process change feed channel.
pub const CHANGE_FEED_CAPACITY: usize = 1024;

/// Core trait for invoice transaction stores.
///
/// Every mutation is single-record and is published on the change feed
/// returned by [`TransactionStore::subscribe`]. All implementations must
/// be thread-safe (Send + Sync).
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persists a new record. Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, record: InvoiceTransaction) -> Result<()>;

    /// Reads a record. Returns None if it does not exist.
    async fn get(&self, transaction_id: &TransactionId) -> Result<Option<InvoiceTransaction>>;

    /// Sets the status of an existing record.
    ///
    /// Fails with `NotFound` if the record is absent and with
    /// `InvalidTransition` if the lifecycle forbids the edge.
    async fn update_status(
        &self,
        transaction_id: &TransactionId,
        status: TransactionStatus,
    ) -> Result<InvoiceTransaction>;

    /// Atomically moves a record from `expected` to `next`.
    ///
    /// Fails with `StatusConflict` carrying the actual status when the
    /// persisted status differs from `expected`; nothing is written then.
    async fn compare_and_set(
        &self,
        transaction_id: &TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<InvoiceTransaction>;

    /// Removes a record explicitly, emitting a removal event.
    async fn remove(&self, transaction_id: &TransactionId) -> Result<Option<InvoiceTransaction>>;

    /// Evicts every record whose ttl has elapsed at `now`, emitting a
    /// removal event for each. Returns the evicted records.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<InvoiceTransaction>>;

    /// Subscribes to the change feed.
    fn subscribe(&self) -> broadcast::Receiver<TransactionChange>;
}

/// Extension trait providing convenience methods for transaction stores.
#[async_trait]
pub trait TransactionStoreExt: TransactionStore {
    /// Reads a record, failing with `NotFound` if it does not exist.
    async fn get_required(&self, transaction_id: &TransactionId) -> Result<InvoiceTransaction> {
        self.get(transaction_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(transaction_id.clone()))
    }

    /// Returns the current status, or the synthetic `NotFound` when absent.
    async fn status_of(&self, transaction_id: &TransactionId) -> Result<TransactionStatus> {
        Ok(self
            .get(transaction_id)
            .await?
            .map(|record| record.status)
            .unwrap_or(TransactionStatus::NotFound))
    }
}

// Blanket implementation for all TransactionStore implementations
impl<T: TransactionStore + ?Sized> TransactionStoreExt for T {}

/// Store of committed invoices.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Commits an invoice. Fails with `AlreadyExists` if the
    /// (customer, invoice number) key is taken.
    async fn put(&self, invoice: Invoice) -> Result<()>;

    /// Reads an invoice by its composite key.
    async fn get(&self, customer_key: &str, invoice_number: &str) -> Result<Option<Invoice>>;

    /// Lists the invoices of a customer, ordered by invoice number.
    async fn list_for_customer(&self, customer_name: &str) -> Result<Vec<Invoice>>;
}

/// Validates a requested status edge before it reaches the backend.
pub fn check_transition(from: TransactionStatus, to: TransactionStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_transition_accepts_lifecycle_edges() {
        assert!(check_transition(TransactionStatus::Generated, TransactionStatus::Received).is_ok());
        assert!(check_transition(TransactionStatus::Received, TransactionStatus::Processed).is_ok());
    }

    #[test]
    fn check_transition_rejects_leaving_terminal_state() {
        let result = check_transition(TransactionStatus::Canceled, TransactionStatus::Received);
        assert!(matches!(
            result,
            Err(StoreError::InvalidTransition {
                from: TransactionStatus::Canceled,
                to: TransactionStatus::Received,
            })
        ));
    }
}
