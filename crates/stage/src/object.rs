use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time-limited permission to write one object under one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCredential {
    /// Fully qualified upload URL, token included.
    pub url: String,
    pub key: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl UploadCredential {
    /// Returns true while the credential may still be used.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// Notification emitted after an object lands in the stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCreated {
    pub bucket: String,
    pub key: String,
    pub size: usize,
    pub created_at: DateTime<Utc>,
}

/// What a stage purge removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagePurge {
    pub credentials: usize,
    pub objects: usize,
}

impl StagePurge {
    pub fn is_empty(&self) -> bool {
        self.credentials == 0 && self.objects == 0
    }
}
