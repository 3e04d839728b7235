//! Invoice transaction record and its status state machine.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConnectionId, TransactionId};

/// Partition key shared by every invoice transaction record.
pub const TRANSACTION_PARTITION: &str = "#transaction";

/// The position of an import transaction in its lifecycle.
///
/// State transitions:
/// ```text
/// Generated ──┬──► Received ──┬──► Processed
///             │               └──► Timeout
///             ├──► Canceled
///             └──► Timeout
/// ```
///
/// `NotFound` is synthetic: it is reported to clients when no record
/// exists and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Upload slot issued, waiting for the file.
    Generated,
    /// File landed in the stage and is being processed.
    Received,
    /// Invoice committed (terminal state).
    Processed,
    /// Canceled by the client before upload (terminal state).
    Canceled,
    /// Expired without completing (terminal state).
    Timeout,
    /// No record exists for the requested transaction.
    NotFound,
}

impl TransactionStatus {
    /// Returns true if the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Generated, Received)
                | (Generated, Canceled)
                | (Generated, Timeout)
                | (Received, Processed)
                | (Received, Timeout)
        )
    }

    /// Returns true if cancellation is still possible.
    pub fn can_cancel(&self) -> bool {
        matches!(self, TransactionStatus::Generated)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Processed | TransactionStatus::Canceled | TransactionStatus::Timeout
        )
    }

    /// Returns true if the import ended without consuming its upload.
    pub fn is_abandoned(&self) -> bool {
        matches!(self, TransactionStatus::Canceled | TransactionStatus::Timeout)
    }

    /// Returns true if the status may be written to a store.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, TransactionStatus::NotFound)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Generated => "GENERATED",
            TransactionStatus::Received => "RECEIVED",
            TransactionStatus::Processed => "PROCESSED",
            TransactionStatus::Canceled => "CANCELED",
            TransactionStatus::Timeout => "TIMEOUT",
            TransactionStatus::NotFound => "NOT_FOUND",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "GENERATED" => Ok(TransactionStatus::Generated),
            "RECEIVED" => Ok(TransactionStatus::Received),
            "PROCESSED" => Ok(TransactionStatus::Processed),
            "CANCELED" => Ok(TransactionStatus::Canceled),
            "TIMEOUT" => Ok(TransactionStatus::Timeout),
            "NOT_FOUND" => Ok(TransactionStatus::NotFound),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// One attempted invoice import.
///
/// The `transaction_id` doubles as the object key in the upload stage.
/// `ttl` is an absolute expiry in epoch seconds; records past it are
/// evicted and show up as removal events on the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTransaction {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub connection_id: ConnectionId,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Lifetime of the upload credential, in seconds.
    pub expires_in: u32,
    pub ttl: i64,
    /// Callback address of the push channel the connection belongs to.
    pub endpoint: String,
}

impl InvoiceTransaction {
    /// Creates a freshly issued transaction in `GENERATED` state.
    pub fn generated(
        transaction_id: TransactionId,
        connection_id: ConnectionId,
        endpoint: impl Into<String>,
        expires_in: u32,
        ttl_secs: u32,
    ) -> Self {
        let created_at = Utc::now();
        let ttl = (created_at + Duration::seconds(i64::from(ttl_secs))).timestamp();
        Self {
            transaction_id,
            status: TransactionStatus::Generated,
            connection_id,
            request_id: None,
            created_at,
            expires_in,
            ttl,
            endpoint: endpoint.into(),
        }
    }

    /// Sets the id of the request that created the transaction.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Overrides the absolute expiry.
    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the partition key of the record.
    pub fn partition_key(&self) -> &'static str {
        TRANSACTION_PARTITION
    }

    /// Returns true if the record's time-to-live has elapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl > 0 && self.ttl <= now.timestamp()
    }
}
