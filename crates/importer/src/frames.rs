//! Frames exchanged with clients over the push channel.

use common::TransactionId;
use serde::{Deserialize, Serialize};
use store::TransactionStatus;

/// Inbound client action, routed on the `action` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientAction {
    /// Request a fresh upload slot.
    GetImportUrl,
    /// Cancel a pending import.
    #[serde(rename_all = "camelCase")]
    CancelImport { transaction_id: TransactionId },
}

impl ClientAction {
    /// Parses a text frame. Returns `None` for anything that is not a known
    /// action.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::GetImportUrl => "getImportUrl",
            ClientAction::CancelImport { .. } => "cancelImport",
        }
    }
}

/// `{transactionId, status}` frame, used for every status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFrame {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
}

impl StatusFrame {
    pub fn new(transaction_id: TransactionId, status: TransactionStatus) -> Self {
        Self {
            transaction_id,
            status,
        }
    }
}

/// Reply to `getImportUrl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlot {
    pub url: String,
    /// Seconds the upload URL stays valid.
    pub expires: u32,
    pub transaction_id: TransactionId,
}
