use thiserror::Error;

use crate::{TransactionId, TransactionStatus};

/// Errors that can occur when interacting with the transaction or invoice stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the transaction.
    #[error("Transaction not found: {0}")]
    NotFound(TransactionId),

    /// A record with the same key already exists.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// The persisted status did not match the expected precondition.
    #[error(
        "Status conflict for transaction {transaction_id}: expected {expected}, found {actual}"
    )]
    StatusConflict {
        transaction_id: TransactionId,
        expected: TransactionStatus,
        actual: TransactionStatus,
    },

    /// The requested edge is not part of the transaction lifecycle.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// A stored row could not be mapped back to a record.
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    /// The backend refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
