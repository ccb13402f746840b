//! Storage quota monitoring and cleanup.

use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use sync_core::constants::{
    STORAGE_CLEANUP_AGE_DAYS, STORAGE_CRITICAL_THRESHOLD_PCT, STORAGE_WARNING_THRESHOLD_PCT,
};
use sync_storage::{EntityStore, Outbox};
use tracing::{info, warn};

/// Reports the device's current storage usage against its platform quota.
/// Platform-specific estimation (disk usage API, `navigator.storage`, etc.)
/// is out of scope here; callers supply an implementation.
pub trait StorageEstimator: Send + Sync {
    /// Fraction of quota consumed, in `[0.0, 1.0]`.
    fn usage_fraction(&self) -> f64;
}

pub struct QuotaMonitor<E: StorageEstimator> {
    estimator: E,
    entity_store: Arc<EntityStore>,
    outbox: Arc<Outbox>,
}

impl<E: StorageEstimator> QuotaMonitor<E> {
    pub fn new(estimator: E, entity_store: Arc<EntityStore>, outbox: Arc<Outbox>) -> Self {
        Self {
            estimator,
            entity_store,
            outbox,
        }
    }

    /// Single poll: warns at 80%, runs cleanup at 95%.
    pub async fn poll(&self) -> Result<()> {
        let usage = self.estimator.usage_fraction();
        if usage >= STORAGE_CRITICAL_THRESHOLD_PCT {
            warn!(usage, "storage quota critical, running cleanup");
            let evicted = self.cleanup().await?;
            info!(evicted, "quota cleanup evicted local copies of synced entities");
        } else if usage >= STORAGE_WARNING_THRESHOLD_PCT {
            warn!(usage, "storage quota warning threshold reached");
        }
        Ok(())
    }

    /// Evicts local copies of entities older than the cleanup age, skipping
    /// anything still referenced by a pending outbox entry: cleanup must
    /// never discard data the device hasn't pushed yet.
    async fn cleanup(&self) -> Result<usize> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(STORAGE_CLEANUP_AGE_DAYS);
        let mut evicted = 0;

        for id in self.entity_store.tasks_eligible_for_eviction(cutoff)? {
            if self.outbox.contains_entity(id)? {
                continue;
            }
            self.entity_store.evict_task(id).await?;
            evicted += 1;
        }
        for id in self.entity_store.comments_eligible_for_eviction(cutoff)? {
            if self.outbox.contains_entity(id)? {
                continue;
            }
            self.entity_store.evict_comment(id).await?;
            evicted += 1;
        }
        Ok(evicted)
    }

    pub async fn run_forever(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.poll().await {
                warn!(%err, "storage quota poll failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedUsage(f64);

    impl StorageEstimator for FixedUsage {
        fn usage_fraction(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn thresholds_are_ordered() {
        assert!(STORAGE_WARNING_THRESHOLD_PCT < STORAGE_CRITICAL_THRESHOLD_PCT);
        let below = FixedUsage(0.5);
        assert!(below.usage_fraction() < STORAGE_WARNING_THRESHOLD_PCT);
    }
}
