//! Change feed events emitted by transaction stores.

use serde::{Deserialize, Serialize};

use crate::{InvoiceTransaction, TRANSACTION_PARTITION, TransactionId};

/// Kind of mutation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Modify,
    Remove,
}

/// A single change-feed record, carrying both images like a stream
/// configured for new and old images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionChange {
    pub kind: ChangeKind,
    pub partition_key: String,
    pub sort_key: TransactionId,
    pub old_image: Option<InvoiceTransaction>,
    pub new_image: Option<InvoiceTransaction>,
}

impl TransactionChange {
    pub fn inserted(record: InvoiceTransaction) -> Self {
        Self {
            kind: ChangeKind::Insert,
            partition_key: record.partition_key().to_string(),
            sort_key: record.transaction_id.clone(),
            old_image: None,
            new_image: Some(record),
        }
    }

    pub fn modified(old: InvoiceTransaction, new: InvoiceTransaction) -> Self {
        Self {
            kind: ChangeKind::Modify,
            partition_key: new.partition_key().to_string(),
            sort_key: new.transaction_id.clone(),
            old_image: Some(old),
            new_image: Some(new),
        }
    }

    pub fn removed(record: InvoiceTransaction) -> Self {
        Self {
            kind: ChangeKind::Remove,
            partition_key: record.partition_key().to_string(),
            sort_key: record.transaction_id.clone(),
            old_image: Some(record),
            new_image: None,
        }
    }

    /// Returns the removed record if this is a removal in the transaction
    /// namespace.
    pub fn removed_transaction(&self) -> Option<&InvoiceTransaction> {
        if self.kind == ChangeKind::Remove && self.partition_key == TRANSACTION_PARTITION {
            self.old_image.as_ref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionId;

    fn record() -> InvoiceTransaction {
        InvoiceTransaction::generated(
            TransactionId::from("abc"),
            ConnectionId::from("conn-1"),
            "ws://localhost/ws",
            300,
            120,
        )
    }

    #[test]
    fn removal_exposes_old_image() {
        let change = TransactionChange::removed(record());
        assert_eq!(change.kind, ChangeKind::Remove);
        assert_eq!(
            change.removed_transaction().map(|r| r.transaction_id.as_str()),
            Some("abc")
        );
    }

    #[test]
    fn removal_outside_namespace_is_ignored() {
        let mut change = TransactionChange::removed(record());
        change.partition_key = "#invoice_alice".to_string();
        assert!(change.removed_transaction().is_none());
    }

    #[test]
    fn insert_is_not_a_removal() {
        let change = TransactionChange::inserted(record());
        assert!(change.removed_transaction().is_none());
        assert!(change.old_image.is_none());
    }
}
