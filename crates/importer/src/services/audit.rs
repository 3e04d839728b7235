//! Audit publisher for abnormal import outcomes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TransactionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::ImportError;
use crate::payload::ImportFailure;

/// Source of every import audit event.
pub const AUDIT_SOURCE: &str = "app.invoice";
/// Detail type of every import audit event.
pub const AUDIT_DETAIL_TYPE: &str = "invoice";

/// Event published for out-of-band monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub source: String,
    pub detail_type: String,
    pub detail: Value,
    pub time: DateTime<Utc>,
}

impl AuditEvent {
    /// Builds an `app.invoice` event describing a failed import.
    pub fn import_failure(
        failure: ImportFailure,
        transaction_id: &TransactionId,
        info: Option<String>,
    ) -> Self {
        let mut detail = serde_json::json!({
            "errorDetail": failure.as_str(),
            "transactionId": transaction_id.as_str(),
        });
        if let Some(info) = info {
            detail["info"] = Value::String(info);
        }
        Self {
            source: AUDIT_SOURCE.to_string(),
            detail_type: AUDIT_DETAIL_TYPE.to_string(),
            detail,
            time: Utc::now(),
        }
    }

    /// Returns the `errorDetail` code, if any.
    pub fn error_detail(&self) -> Option<&str> {
        self.detail.get("errorDetail")?.as_str()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.detail.get("transactionId")?.as_str()
    }
}

/// Fire-and-forget sink for audit events.
#[async_trait]
pub trait AuditPublisher: Send + Sync {
    async fn publish(&self, event: AuditEvent) -> Result<(), ImportError>;
}

/// Publishes audit events as structured log records on the `audit` target.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditPublisher;

#[async_trait]
impl AuditPublisher for TracingAuditPublisher {
    async fn publish(&self, event: AuditEvent) -> Result<(), ImportError> {
        let detail = serde_json::to_string(&event.detail)?;
        tracing::warn!(
            target: "audit",
            source = %event.source,
            detail_type = %event.detail_type,
            detail = %detail,
            time = %event.time,
            "audit event"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryAuditState {
    events: Vec<AuditEvent>,
    fail_on_publish: bool,
}

/// In-memory audit publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditPublisher {
    state: Arc<RwLock<InMemoryAuditState>>,
}

impl InMemoryAuditPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to reject every event.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().await.fail_on_publish = fail;
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.state.read().await.events.clone()
    }

    /// Returns the events carrying the given failure code.
    pub async fn events_with(&self, failure: ImportFailure) -> Vec<AuditEvent> {
        self.state
            .read()
            .await
            .events
            .iter()
            .filter(|event| event.error_detail() == Some(failure.as_str()))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditPublisher for InMemoryAuditPublisher {
    async fn publish(&self, event: AuditEvent) -> Result<(), ImportError> {
        let mut state = self.state.write().await;
        if state.fail_on_publish {
            return Err(ImportError::Audit("audit sink unavailable".to_string()));
        }
        state.events.push(event);
        Ok(())
    }
}
