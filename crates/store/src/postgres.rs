use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::sync::broadcast;

use crate::{
    ConnectionId, Invoice, InvoiceTransaction, Result, StoreError, TransactionChange,
    TransactionId, TransactionStatus,
    store::{CHANGE_FEED_CAPACITY, InvoiceStore, TransactionStore, check_transition},
};

const TRANSACTION_COLUMNS: &str =
    "transaction_id, status, connection_id, request_id, created_at, expires_in, ttl, endpoint";

const INVOICE_COLUMNS: &str = "customer_key, invoice_number, customer_name, total_value, product_id, quantity, transaction_id, created_at, ttl";

/// PostgreSQL-backed transaction store.
///
/// PostgreSQL has no change stream or row expiry of its own, so the
/// change feed is published in-process by this store on each mutation
/// and expiry relies on an external caller of `purge_expired`.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
    feed: broadcast::Sender<TransactionChange>,
}

impl PostgresTransactionStore {
    /// Creates a new PostgreSQL transaction store.
    pub fn new(pool: PgPool) -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, feed }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn publish(&self, change: TransactionChange) {
        let _ = self.feed.send(change);
    }

    fn row_to_record(row: PgRow) -> Result<InvoiceTransaction> {
        let status: String = row.try_get("status")?;
        let expires_in: i64 = row.try_get("expires_in")?;

        Ok(InvoiceTransaction {
            transaction_id: TransactionId::new(row.try_get::<String, _>("transaction_id")?),
            status: status.parse().map_err(StoreError::InvalidRecord)?,
            connection_id: ConnectionId::new(row.try_get::<String, _>("connection_id")?),
            request_id: row.try_get("request_id")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            expires_in: u32::try_from(expires_in)
                .map_err(|e| StoreError::InvalidRecord(format!("expires_in: {e}")))?,
            ttl: row.try_get("ttl")?,
            endpoint: row.try_get("endpoint")?,
        })
    }

    async fn current_status(&self, transaction_id: &TransactionId) -> Result<TransactionStatus> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM invoice_transactions WHERE transaction_id = $1",
        )
        .bind(transaction_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match status {
            Some(status) => status.parse().map_err(StoreError::InvalidRecord),
            None => Err(StoreError::NotFound(transaction_id.clone())),
        }
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn create(&self, record: InvoiceTransaction) -> Result<()> {
        if !record.status.is_persistable() {
            return Err(StoreError::InvalidRecord(format!(
                "status {} cannot be persisted",
                record.status
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO invoice_transactions (transaction_id, status, connection_id, request_id, created_at, expires_in, ttl, endpoint)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.transaction_id.as_str())
        .bind(record.status.as_str())
        .bind(record.connection_id.as_str())
        .bind(&record.request_id)
        .bind(record.created_at)
        .bind(i64::from(record.expires_in))
        .bind(record.ttl)
        .bind(&record.endpoint)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::AlreadyExists(record.transaction_id.to_string());
            }
            StoreError::Database(e)
        })?;

        self.publish(TransactionChange::inserted(record));
        Ok(())
    }

    async fn get(&self, transaction_id: &TransactionId) -> Result<Option<InvoiceTransaction>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM invoice_transactions WHERE transaction_id = $1"
        ))
        .bind(transaction_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn update_status(
        &self,
        transaction_id: &TransactionId,
        status: TransactionStatus,
    ) -> Result<InvoiceTransaction> {
        let mut tx = self.pool.begin().await?;

        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM invoice_transactions WHERE transaction_id = $1 FOR UPDATE"
        ))
        .bind(transaction_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let old = row
            .map(Self::row_to_record)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(transaction_id.clone()))?;

        check_transition(old.status, status)?;

        sqlx::query("UPDATE invoice_transactions SET status = $2 WHERE transaction_id = $1")
            .bind(transaction_id.as_str())
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let new = InvoiceTransaction {
            status,
            ..old.clone()
        };
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

        let row: Option<PgRow> = sqlx::query(&format!(
            r#"
            UPDATE invoice_transactions SET status = $3
            WHERE transaction_id = $1 AND status = $2
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(transaction_id.as_str())
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let new = Self::row_to_record(row)?;
                let old = InvoiceTransaction {
                    status: expected,
                    ..new.clone()
                };
                self.publish(TransactionChange::modified(old, new.clone()));
                Ok(new)
            }
            // Nothing matched: either the record is gone or its status moved.
            None => {
                let actual = self.current_status(transaction_id).await?;
                tracing::debug!(
                    transaction_id = %transaction_id,
                    expected = %expected,
                    actual = %actual,
                    "compare-and-set rejected"
                );
                Err(StoreError::StatusConflict {
                    transaction_id: transaction_id.clone(),
                    expected,
                    actual,
                })
            }
        }
    }

    async fn remove(&self, transaction_id: &TransactionId) -> Result<Option<InvoiceTransaction>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "DELETE FROM invoice_transactions WHERE transaction_id = $1 RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(transaction_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let removed = row.map(Self::row_to_record).transpose()?;
        if let Some(ref record) = removed {
            self.publish(TransactionChange::removed(record.clone()));
        }
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<InvoiceTransaction>> {
        let rows = sqlx::query(&format!(
            "DELETE FROM invoice_transactions WHERE ttl > 0 AND ttl <= $1 RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await?;

        let removed: Vec<InvoiceTransaction> = rows
            .into_iter()
            .map(Self::row_to_record)
            .collect::<Result<_>>()?;

        metrics::counter!("store_records_evicted_total").increment(removed.len() as u64);
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "expired transaction rows deleted");
        }
        for record in &removed {
            self.publish(TransactionChange::removed(record.clone()));
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransactionChange> {
        self.feed.subscribe()
    }
}

/// PostgreSQL-backed invoice store.
#[derive(Clone)]
pub struct PostgresInvoiceStore {
    pool: PgPool,
}

impl PostgresInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_invoice(row: PgRow) -> Result<Invoice> {
        let quantity: i64 = row.try_get("quantity")?;

        Ok(Invoice {
            customer_key: row.try_get("customer_key")?,
            invoice_number: row.try_get("invoice_number")?,
            customer_name: row.try_get("customer_name")?,
            total_value: row.try_get("total_value")?,
            product_id: row.try_get("product_id")?,
            quantity: u32::try_from(quantity)
                .map_err(|e| StoreError::InvalidRecord(format!("quantity: {e}")))?,
            transaction_id: TransactionId::new(row.try_get::<String, _>("transaction_id")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            ttl: row.try_get("ttl")?,
        })
    }
}

#[async_trait]
impl InvoiceStore for PostgresInvoiceStore {
    async fn put(&self, invoice: Invoice) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invoices (customer_key, invoice_number, customer_name, total_value, product_id, quantity, transaction_id, created_at, ttl)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&invoice.customer_key)
        .bind(&invoice.invoice_number)
        .bind(&invoice.customer_name)
        .bind(invoice.total_value)
        .bind(&invoice.product_id)
        .bind(i64::from(invoice.quantity))
        .bind(invoice.transaction_id.as_str())
        .bind(invoice.created_at)
        .bind(invoice.ttl)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::AlreadyExists(invoice.key());
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get(&self, customer_key: &str, invoice_number: &str) -> Result<Option<Invoice>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE customer_key = $1 AND invoice_number = $2"
        ))
        .bind(customer_key)
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_invoice).transpose()
    }

    async fn list_for_customer(&self, customer_name: &str) -> Result<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE customer_key = $1 ORDER BY invoice_number ASC"
        ))
        .bind(Invoice::customer_key_for(customer_name))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_invoice).collect()
    }
}
