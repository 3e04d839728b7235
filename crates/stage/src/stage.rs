use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::{ObjectCreated, Result, StagePurge, UploadCredential};

/// Write-once object storage used as a landing area for uploads.
#[async_trait]
pub trait ObjectStage: Send + Sync {
    /// Name of the bucket notifications refer to.
    fn bucket(&self) -> &str;

    /// Issues a credential allowing a single write to `key` for `ttl_secs`.
    async fn signed_upload_url(&self, key: &str, ttl_secs: u32) -> Result<UploadCredential>;

    /// Performs the out-of-band client upload authorised by `token`.
    ///
    /// Fails with `CredentialInvalid` for unknown, reused or mismatched
    /// tokens, `CredentialExpired` once the window has elapsed, and
    /// `AlreadyExists` if the key was written before.
    async fn put_with_credential(&self, key: &str, token: &str, body: Vec<u8>) -> Result<()>;

    /// Fetches the raw object.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    /// Deletes the object. Returns false if nothing was stored under the key.
    async fn delete_object(&self, key: &str) -> Result<bool>;

    /// Invalidates the outstanding credential for `key`. Returns false if
    /// there was none.
    async fn revoke(&self, key: &str) -> Result<bool>;

    /// Drops credentials that expired before `now` and objects older than
    /// the stage's object lifetime.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<StagePurge>;

    /// Subscribes to object creation notifications.
    fn subscribe(&self) -> broadcast::Receiver<ObjectCreated>;
}
