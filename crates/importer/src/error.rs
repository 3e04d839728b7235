//! Import error types.

use stage::StageError;
use store::StoreError;
use thiserror::Error;

use crate::payload::PayloadError;

/// Errors that can occur inside import handlers.
///
/// None of these reach the client as an error frame; handlers convert
/// them into a status value or a log line.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Transaction or invoice store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Object stage error.
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    /// The uploaded payload could not be turned into an invoice.
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    /// The audit publisher refused an event.
    #[error("Audit publish failed: {0}")]
    Audit(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for import results.
pub type Result<T> = std::result::Result<T, ImportError>;
