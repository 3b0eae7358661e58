//! TTL eviction
//!
//! A periodic sweep reclaims artifacts and collections idle for longer than
//! their TTL. Entries in background, or whose record is locked by a running
//! operation, are left for a later sweep.

use crate::registry::Registry;
use crate::slot::{ArtifactSlot, CollectionSlot};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub artifacts: usize,
    pub collections: usize,
    /// Expired artifacts skipped because an operation held the record
    pub skipped_locked: usize,
}

impl Registry {
    /// Sweep as of now
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now()).await
    }

    /// Evict everything expired as of `now`
    pub async fn sweep_at(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        // Collect first; no shard lock is held across the hooks.
        let artifacts: Vec<Arc<ArtifactSlot>> = self
            .artifacts
            .iter()
            .filter(|entry| !entry.is_in_background() && entry.is_expired_at(now))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for slot in artifacts {
            let Ok(record) = slot.cell().try_lock() else {
                report.skipped_locked += 1;
                continue;
            };
            if slot.is_in_background() || !slot.is_expired_at(now) {
                continue;
            }
            if let Err(error) = self.retire_artifact(&slot, &record).await {
                tracing::warn!(artifact = %slot.id(), %error, "eviction left a storage entry behind");
            }
            tracing::debug!(artifact = %slot.id(), "evicted");
            report.artifacts += 1;
        }

        let collections: Vec<Arc<CollectionSlot>> = self
            .collections
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for slot in collections {
            match self.retire_collection(&slot).await {
                Ok(collection) => tracing::debug!(collection = %collection.id(), "evicted"),
                Err(error) => tracing::warn!(%error, "eviction left a storage entry behind"),
            }
            report.collections += 1;
        }

        if report != SweepReport::default() {
            tracing::debug!(
                artifacts = report.artifacts,
                collections = report.collections,
                skipped_locked = report.skipped_locked,
                "sweep finished"
            );
        }
        report
    }

    /// Sweep every `sweep_interval` until the registry is dropped
    pub fn start_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let period = self.config.sweep_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.sweep().await;
            }
        })
    }
}
