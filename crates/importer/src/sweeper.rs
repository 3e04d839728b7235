//! Periodic eviction of expired transaction records and staged objects.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stage::ObjectStage;
use store::TransactionStore;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Evicts records whose `ttl` has elapsed. Evictions surface on the change
/// feed, where the [`ExpiryReaper`](crate::ExpiryReaper) picks them up.
///
/// With a stage attached, each sweep also purges expired credentials and
/// objects past their lifetime.
pub struct ExpirySweeper {
    transactions: Arc<dyn TransactionStore>,
    stage: Option<Arc<dyn ObjectStage>>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(transactions: Arc<dyn TransactionStore>, interval: Duration) -> Self {
        Self {
            transactions,
            stage: None,
            interval,
        }
    }

    pub fn with_stage(mut self, stage: Arc<dyn ObjectStage>) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Runs one sweep and returns the number of evicted records.
    pub async fn sweep_once(&self) -> Result<usize> {
        let now = Utc::now();
        let removed = self.transactions.purge_expired(now).await?;
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "expired transactions evicted");
        }
        if let Some(stage) = &self.stage {
            stage.purge_expired(now).await?;
        }
        Ok(removed.len())
    }

    /// Sweeps forever at the configured interval. Abort the handle to stop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    tracing::error!(error = %e, "expiry sweep failed");
                }
            }
        })
    }
}
