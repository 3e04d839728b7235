use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use crate::{ObjectCreated, ObjectStage, Result, StageError, StagePurge, UploadCredential};

const NOTIFICATION_CAPACITY: usize = 1024;

/// Objects are kept for one day unless configured otherwise.
pub const DEFAULT_OBJECT_LIFETIME_SECS: i64 = 86_400;

#[derive(Debug)]
struct StagedObject {
    body: Vec<u8>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct InMemoryStageState {
    objects: HashMap<String, StagedObject>,
    /// Outstanding credentials by key. Removed on first use.
    credentials: HashMap<String, UploadCredential>,
}

/// In-memory object stage.
///
/// Upload URLs point at `{base_url}/stage/{bucket}/{key}?token=...`; the
/// api crate serves that route and forwards it to
/// [`ObjectStage::put_with_credential`].
#[derive(Clone)]
pub struct InMemoryObjectStage {
    bucket: String,
    base_url: String,
    object_lifetime: Duration,
    state: Arc<RwLock<InMemoryStageState>>,
    notifications: broadcast::Sender<ObjectCreated>,
}

impl InMemoryObjectStage {
    /// Creates a new empty stage for `bucket`, issuing URLs under `base_url`.
    pub fn new(bucket: impl Into<String>, base_url: impl Into<String>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            bucket: bucket.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            object_lifetime: Duration::seconds(DEFAULT_OBJECT_LIFETIME_SECS),
            state: Arc::new(RwLock::new(InMemoryStageState::default())),
            notifications,
        }
    }

    /// Sets how long an object may stay staged before a purge drops it.
    pub fn with_object_lifetime(mut self, lifetime_secs: i64) -> Self {
        self.object_lifetime = Duration::seconds(lifetime_secs);
        self
    }

    /// Returns the number of outstanding credentials.
    pub async fn credential_count(&self) -> usize {
        self.state.read().await.credentials.len()
    }

    /// Returns the number of stored objects.
    pub async fn object_count(&self) -> usize {
        self.state.read().await.objects.len()
    }

    /// Returns true if an object exists under the key.
    pub async fn contains(&self, key: &str) -> bool {
        self.state.read().await.objects.contains_key(key)
    }

    fn upload_url(&self, key: &str, token: &str) -> String {
        format!(
            "{}/stage/{}/{}?token={}",
            self.base_url, self.bucket, key, token
        )
    }
}

#[async_trait]
impl ObjectStage for InMemoryObjectStage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn signed_upload_url(&self, key: &str, ttl_secs: u32) -> Result<UploadCredential> {
        let token = Uuid::new_v4().simple().to_string();
        let credential = UploadCredential {
            url: self.upload_url(key, &token),
            key: key.to_string(),
            token,
            expires_at: Utc::now() + Duration::seconds(i64::from(ttl_secs)),
        };

        self.state
            .write()
            .await
            .credentials
            .insert(key.to_string(), credential.clone());

        tracing::debug!(key, ttl_secs, "upload credential issued");
        Ok(credential)
    }

    async fn put_with_credential(&self, key: &str, token: &str, body: Vec<u8>) -> Result<()> {
        let size = body.len();
        let mut state = self.state.write().await;

        let credential = state
            .credentials
            .get(key)
            .filter(|credential| credential.token == token)
            .cloned()
            .ok_or_else(|| StageError::CredentialInvalid(key.to_string()))?;

        if !credential.is_valid_at(Utc::now()) {
            state.credentials.remove(key);
            return Err(StageError::CredentialExpired(key.to_string()));
        }

        if state.objects.contains_key(key) {
            return Err(StageError::AlreadyExists(key.to_string()));
        }

        state.credentials.remove(key);
        state.objects.insert(
            key.to_string(),
            StagedObject {
                body,
                created_at: Utc::now(),
            },
        );
        drop(state);

        metrics::counter!("stage_objects_created_total").increment(1);
        tracing::info!(bucket = %self.bucket, key, size, "object created");

        let _ = self.notifications.send(ObjectCreated {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            size,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.state
            .read()
            .await
            .objects
            .get(key)
            .map(|object| object.body.clone())
            .ok_or_else(|| StageError::ObjectNotFound(key.to_string()))
    }

    async fn delete_object(&self, key: &str) -> Result<bool> {
        Ok(self.state.write().await.objects.remove(key).is_some())
    }

    async fn revoke(&self, key: &str) -> Result<bool> {
        let revoked = self.state.write().await.credentials.remove(key).is_some();
        if revoked {
            tracing::debug!(key, "upload credential revoked");
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<StagePurge> {
        let mut state = self.state.write().await;

        let credentials_before = state.credentials.len();
        state
            .credentials
            .retain(|_, credential| credential.is_valid_at(now));

        let objects_before = state.objects.len();
        let lifetime = self.object_lifetime;
        state
            .objects
            .retain(|_, object| object.created_at + lifetime > now);

        let purge = StagePurge {
            credentials: credentials_before - state.credentials.len(),
            objects: objects_before - state.objects.len(),
        };
        drop(state);

        if !purge.is_empty() {
            metrics::counter!("stage_objects_expired_total").increment(purge.objects as u64);
            tracing::info!(
                bucket = %self.bucket,
                credentials = purge.credentials,
                objects = purge.objects,
                "stage purged"
            );
        }
        Ok(purge)
    }

    fn subscribe(&self) -> broadcast::Receiver<ObjectCreated> {
        self.notifications.subscribe()
    }
}
