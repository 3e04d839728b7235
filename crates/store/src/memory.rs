use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast};

use crate::{
    Invoice, InvoiceTransaction, Result, StoreError, TransactionChange, TransactionId,
    TransactionStatus,
    store::{CHANGE_FEED_CAPACITY, InvoiceStore, TransactionStore, check_transition},
};

/// In-memory transaction store implementation.
///
/// Provides the same interface and change feed as the PostgreSQL
/// implementation. Time-to-live is enforced by [`TransactionStore::purge_expired`].
#[derive(Clone)]
pub struct InMemoryTransactionStore {
    records: Arc<RwLock<HashMap<TransactionId, InvoiceTransaction>>>,
    feed: broadcast::Sender<TransactionChange>,
    faults: Arc<StoreFaults>,
}

#[derive(Debug, Default)]
struct StoreFaults {
    fail_on_create: AtomicBool,
    fail_on_write: AtomicBool,
}

impl StoreFaults {
    fn check(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{operation} refused")));
        }
        Ok(())
    }
}

impl InMemoryTransactionStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            feed,
            faults: Arc::new(StoreFaults::default()),
        }
    }

    /// Configures the store to fail every `create` call.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.faults.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Configures the store to fail every status write.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.faults.fail_on_write.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored records.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Clears all records without emitting change events.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    fn publish(&self, change: TransactionChange) {
        // No subscribers is fine: the feed is observational.
        let _ = self.feed.send(change);
    }
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn create(&self, record: InvoiceTransaction) -> Result<()> {
        StoreFaults::check(&self.faults.fail_on_create, "create")?;
        if !record.status.is_persistable() {
            return Err(StoreError::InvalidRecord(format!(
                "status {} cannot be persisted",
                record.status
            )));
        }

        let mut records = self.records.write().await;
        if records.contains_key(&record.transaction_id) {
            return Err(StoreError::AlreadyExists(record.transaction_id.to_string()));
        }
        records.insert(record.transaction_id.clone(), record.clone());
        drop(records);

        self.publish(TransactionChange::inserted(record));
        Ok(())
    }

    async fn get(&self, transaction_id: &TransactionId) -> Result<Option<InvoiceTransaction>> {
        Ok(self.records.read().await.get(transaction_id).cloned())
    }

    async fn update_status(
        &self,
        transaction_id: &TransactionId,
        status: TransactionStatus,
    ) -> Result<InvoiceTransaction> {
        StoreFaults::check(&self.faults.fail_on_write, "update_status")?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(transaction_id)
            .ok_or_else(|| StoreError::NotFound(transaction_id.clone()))?;

        check_transition(record.status, status)?;

        let old = record.clone();
        record.status = status;
        let new = record.clone();
        drop(records);

        self.publish(TransactionChange::modified(old, new.clone()));
        Ok(new)
    }

    async fn compare_and_set(
        &self,
        transaction_id: &TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<InvoiceTransaction> {
        check_transition(expected, next)?;
        StoreFaults::check(&self.faults.fail_on_write, "compare_and_set")?;

        let mut records = self.records.write().await;
        let record = records
            .get_mut(transaction_id)
            .ok_or_else(|| StoreError::NotFound(transaction_id.clone()))?;

        if record.status != expected {
            return Err(StoreError::StatusConflict {
                transaction_id: transaction_id.clone(),
                expected,
                actual: record.status,
            });
        }

        let old = record.clone();
        record.status = next;
        let new = record.clone();
        drop(records);

        self.publish(TransactionChange::modified(old, new.clone()));
        Ok(new)
    }

    async fn remove(&self, transaction_id: &TransactionId) -> Result<Option<InvoiceTransaction>> {
        let removed = self.records.write().await.remove(transaction_id);
        if let Some(ref record) = removed {
            self.publish(TransactionChange::removed(record.clone()));
        }
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<InvoiceTransaction>> {
        let mut records = self.records.write().await;
        let expired: Vec<TransactionId> = records
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.transaction_id.clone())
            .collect();

        let removed: Vec<InvoiceTransaction> = expired
            .iter()
            .filter_map(|id| records.remove(id))
            .collect();
        drop(records);

        metrics::counter!("store_records_evicted_total").increment(removed.len() as u64);
        for record in &removed {
            self.publish(TransactionChange::removed(record.clone()));
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransactionChange> {
        self.feed.subscribe()
    }
}

/// In-memory invoice store implementation.
#[derive(Clone, Default)]
pub struct InMemoryInvoiceStore {
    invoices: Arc<RwLock<BTreeMap<(String, String), Invoice>>>,
    fail_on_put: Arc<AtomicBool>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail every `put` call.
    pub fn set_fail_on_put(&self, fail: bool) {
        self.fail_on_put.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of committed invoices.
    pub async fn invoice_count(&self) -> usize {
        self.invoices.read().await.len()
    }

    /// Returns every invoice committed by the given transaction.
    pub async fn find_by_transaction(&self, transaction_id: &TransactionId) -> Vec<Invoice> {
        self.invoices
            .read()
            .await
            .values()
            .filter(|invoice| &invoice.transaction_id == transaction_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn put(&self, invoice: Invoice) -> Result<()> {
        StoreFaults::check(&self.fail_on_put, "put")?;
        let key = (invoice.customer_key.clone(), invoice.invoice_number.clone());
        let mut invoices = self.invoices.write().await;
        if invoices.contains_key(&key) {
            return Err(StoreError::AlreadyExists(invoice.key()));
        }
        invoices.insert(key, invoice);
        Ok(())
    }

    async fn get(&self, customer_key: &str, invoice_number: &str) -> Result<Option<Invoice>> {
        let key = (customer_key.to_string(), invoice_number.to_string());
        Ok(self.invoices.read().await.get(&key).cloned())
    }

    async fn list_for_customer(&self, customer_name: &str) -> Result<Vec<Invoice>> {
        let customer_key = Invoice::customer_key_for(customer_name);
        Ok(self
            .invoices
            .read()
            .await
            .iter()
            .filter(|((key, _), _)| key == &customer_key)
            .map(|(_, invoice)| invoice.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeKind, ConnectionId, TransactionStoreExt};
    use chrono::Duration;

    fn create_test_record(id: &str) -> InvoiceTransaction {
        InvoiceTransaction::generated(
            TransactionId::from(id),
            ConnectionId::from("conn-1"),
            "ws://localhost:3000/ws",
            300,
            120,
        )
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = InMemoryTransactionStore::new();
        store.create(create_test_record("abc")).await.unwrap();

        let record = store.get(&TransactionId::from("abc")).await.unwrap();
        assert_eq!(record.unwrap().status, TransactionStatus::Generated);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let store = InMemoryTransactionStore::new();
        store.create(create_test_record("abc")).await.unwrap();

        let result = store.create(create_test_record("abc")).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn create_rejects_synthetic_status() {
        let store = InMemoryTransactionStore::new();
        let mut record = create_test_record("abc");
        record.status = TransactionStatus::NotFound;

        let result = store.create(record).await;
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn compare_and_set_applies_when_expected_matches() {
        let store = InMemoryTransactionStore::new();
        let id = TransactionId::from("abc");
        store.create(create_test_record("abc")).await.unwrap();

        let updated = store
            .compare_and_set(&id, TransactionStatus::Generated, TransactionStatus::Received)
            .await
            .unwrap();
        assert_eq!(updated.status, TransactionStatus::Received);
        assert_eq!(
            store.status_of(&id).await.unwrap(),
            TransactionStatus::Received
        );
    }

    #[tokio::test]
    async fn compare_and_set_reports_actual_status_on_conflict() {
        let store = InMemoryTransactionStore::new();
        let id = TransactionId::from("abc");
        store.create(create_test_record("abc")).await.unwrap();
        store
            .compare_and_set(&id, TransactionStatus::Generated, TransactionStatus::Received)
            .await
            .unwrap();

        let result = store
            .compare_and_set(&id, TransactionStatus::Generated, TransactionStatus::Canceled)
            .await;
        assert!(matches!(
            result,
            Err(StoreError::StatusConflict {
                actual: TransactionStatus::Received,
                ..
            })
        ));
        assert_eq!(
            store.status_of(&id).await.unwrap(),
            TransactionStatus::Received
        );
    }

    #[tokio::test]
    async fn compare_and_set_missing_record() {
        let store = InMemoryTransactionStore::new();
        let result = store
            .compare_and_set(
                &TransactionId::from("missing"),
                TransactionStatus::Generated,
                TransactionStatus::Canceled,
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_compare_and_set_has_single_winner() {
        let store = InMemoryTransactionStore::new();
        let id = TransactionId::from("abc");
        store.create(create_test_record("abc")).await.unwrap();

        let (cancel, receive) = tokio::join!(
            store.compare_and_set(&id, TransactionStatus::Generated, TransactionStatus::Canceled),
            store.compare_and_set(&id, TransactionStatus::Generated, TransactionStatus::Received),
        );
        assert!(cancel.is_ok() ^ receive.is_ok());
    }

    #[tokio::test]
    async fn update_status_enforces_lifecycle() {
        let store = InMemoryTransactionStore::new();
        let id = TransactionId::from("abc");
        store.create(create_test_record("abc")).await.unwrap();
        store
            .update_status(&id, TransactionStatus::Canceled)
            .await
            .unwrap();

        let result = store.update_status(&id, TransactionStatus::Received).await;
        assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn update_status_missing_record() {
        let store = InMemoryTransactionStore::new();
        let result = store
            .update_status(&TransactionId::from("missing"), TransactionStatus::Received)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn status_of_missing_is_not_found() {
        let store = InMemoryTransactionStore::new();
        let status = store.status_of(&TransactionId::from("nope")).await.unwrap();
        assert_eq!(status, TransactionStatus::NotFound);
    }

    #[tokio::test]
    async fn change_feed_reports_insert_modify_remove() {
        let store = InMemoryTransactionStore::new();
        let mut feed = store.subscribe();
        let id = TransactionId::from("abc");

        store.create(create_test_record("abc")).await.unwrap();
        store
            .compare_and_set(&id, TransactionStatus::Generated, TransactionStatus::Received)
            .await
            .unwrap();
        store.remove(&id).await.unwrap();

        let insert = feed.recv().await.unwrap();
        assert_eq!(insert.kind, ChangeKind::Insert);
        let modify = feed.recv().await.unwrap();
        assert_eq!(modify.kind, ChangeKind::Modify);
        assert_eq!(
            modify.old_image.map(|r| r.status),
            Some(TransactionStatus::Generated)
        );
        let remove = feed.recv().await.unwrap();
        assert_eq!(
            remove.removed_transaction().map(|r| r.status),
            Some(TransactionStatus::Received)
        );
    }

    #[tokio::test]
    async fn purge_expired_evicts_only_elapsed_records() {
        let store = InMemoryTransactionStore::new();
        let mut feed = store.subscribe();
        let now = Utc::now();

        store
            .create(create_test_record("old").with_ttl((now - Duration::seconds(1)).timestamp()))
            .await
            .unwrap();
        store
            .create(create_test_record("fresh").with_ttl((now + Duration::hours(1)).timestamp()))
            .await
            .unwrap();

        let removed = store.purge_expired(now).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].transaction_id.as_str(), "old");
        assert_eq!(store.record_count().await, 1);

        // Skip the two inserts.
        feed.recv().await.unwrap();
        feed.recv().await.unwrap();
        let change = feed.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Remove);
        assert_eq!(change.sort_key.as_str(), "old");
    }

    #[tokio::test]
    async fn invoice_put_and_get() {
        let store = InMemoryInvoiceStore::new();
        let invoice = Invoice::new("alice", "INV-1", 99.9, "p-1", 3, TransactionId::from("abc"));
        store.put(invoice.clone()).await.unwrap();

        let fetched = store.get("#invoice_alice", "INV-1").await.unwrap();
        assert_eq!(fetched, Some(invoice));
        assert_eq!(
            store
                .find_by_transaction(&TransactionId::from("abc"))
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn invoice_put_is_write_once() {
        let store = InMemoryInvoiceStore::new();
        let invoice = Invoice::new("alice", "INV-1", 99.9, "p-1", 3, TransactionId::from("abc"));
        store.put(invoice.clone()).await.unwrap();

        let result = store.put(invoice).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.invoice_count().await, 1);
    }

    #[tokio::test]
    async fn invoice_list_for_customer() {
        let store = InMemoryInvoiceStore::new();
        for (customer, number) in [("alice", "INV-2"), ("bob", "INV-1"), ("alice", "INV-1")] {
            store
                .put(Invoice::new(
                    customer,
                    number,
                    1.0,
                    "p-1",
                    1,
                    TransactionId::generate(),
                ))
                .await
                .unwrap();
        }

        let alice = store.list_for_customer("alice").await.unwrap();
        let numbers: Vec<_> = alice.iter().map(|i| i.invoice_number.as_str()).collect();
        assert_eq!(numbers, vec!["INV-1", "INV-2"]);
    }

    #[tokio::test]
    async fn fail_on_create_rejects_and_stores_nothing() {
        let store = InMemoryTransactionStore::new();
        let mut feed = store.subscribe();
        store.set_fail_on_create(true);

        let result = store.create(create_test_record("abc")).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.record_count().await, 0);
        assert!(feed.try_recv().is_err());

        store.set_fail_on_create(false);
        store.create(create_test_record("abc")).await.unwrap();
    }

    #[tokio::test]
    async fn fail_on_write_leaves_status_untouched() {
        let store = InMemoryTransactionStore::new();
        let id = TransactionId::from("abc");
        store.create(create_test_record("abc")).await.unwrap();
        store.set_fail_on_write(true);

        let cas = store
            .compare_and_set(&id, TransactionStatus::Generated, TransactionStatus::Received)
            .await;
        assert!(matches!(cas, Err(StoreError::Unavailable(_))));
        let update = store.update_status(&id, TransactionStatus::Canceled).await;
        assert!(matches!(update, Err(StoreError::Unavailable(_))));
        assert_eq!(
            store.status_of(&id).await.unwrap(),
            TransactionStatus::Generated
        );
    }

    #[tokio::test]
    async fn invoice_fail_on_put() {
        let store = InMemoryInvoiceStore::new();
        store.set_fail_on_put(true);

        let result = store
            .put(Invoice::new("alice", "INV-1", 1.0, "p", 1, TransactionId::from("abc")))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.invoice_count().await, 0);
    }
}
