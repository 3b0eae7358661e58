//! Restoring artifacts and collections from storage
//!
//! Single entries are restored lazily on a lookup miss. A bulk restore walks
//! the whole store at startup.

use crate::collection::Collection;
use crate::error::RegistryError;
use crate::registry::Registry;
use crate::slot::{ArtifactSlot, CollectionSlot};
use crate::storage::{self, ArtifactLoadedCallback, PersistedArtifact, StorageKey};
use alr_context::MessageLog;
use alr_core::{ArtifactId, CollectionId, UserId};
use std::sync::Arc;

/// Outcome of [`Registry::load_all_artifacts`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub collections: usize,
    pub artifacts: usize,
    /// Persisted artifacts whose factory is not registered
    pub unknown_factory: usize,
    /// Entries that could not be decoded or failed their integrity check
    pub invalid: usize,
}

impl Registry {
    pub(crate) async fn restore_artifact(
        &self,
        id: ArtifactId,
    ) -> Result<Arc<ArtifactSlot>, RegistryError> {
        let bytes = self
            .storage
            .load(StorageKey::Artifact(id))
            .await?
            .ok_or(RegistryError::UnknownArtifact(id))?;
        let slot = self.rehydrate(PersistedArtifact::decode(&bytes)?)?;
        tracing::debug!(artifact = %id, "restored lazily");
        Ok(slot)
    }

    pub(crate) async fn restore_collection(
        &self,
        id: CollectionId,
    ) -> Result<Arc<CollectionSlot>, RegistryError> {
        let bytes = self
            .storage
            .load(StorageKey::Collection(id))
            .await?
            .ok_or(RegistryError::UnknownCollection(id))?;
        let collection: Collection = serde_json::from_slice(&bytes)?;
        tracing::debug!(collection = %id, "restored lazily");
        Ok(self.insert_collection(collection))
    }

    /// Rebuild a slot through the record's factory. A live entry with the
    /// same id wins over the restored one.
    fn rehydrate(&self, persisted: PersistedArtifact) -> Result<Arc<ArtifactSlot>, RegistryError> {
        let factory = self.factory(persisted.record.factory())?;
        let record = factory.restore(persisted.record)?;
        record.verify()?;

        let ttl = factory.time_to_live_untouched(&record);
        let id = record.id();
        let slot = Arc::new(ArtifactSlot::new(
            record,
            persisted.owner,
            factory.behavior(),
            ttl,
            MessageLog::new(),
        ));
        Ok(Arc::clone(self.artifacts.entry(id).or_insert(slot).value()))
    }

    fn insert_collection(&self, collection: Collection) -> Arc<CollectionSlot> {
        let id = collection.id();
        let slot = Arc::new(CollectionSlot::new(
            collection,
            Arc::clone(&self.collection_factory),
        ));
        Arc::clone(self.collections.entry(id).or_insert(slot).value())
    }

    /// Restore everything in storage: collections first, then artifacts.
    ///
    /// Artifacts whose factory is unknown are skipped and counted.
    ///
    /// # Errors
    /// Storage backend failures.
    pub async fn load_all_artifacts(&self) -> Result<RestoreReport, RegistryError> {
        let mut rehydrator = Rehydrator {
            registry: self,
            report: RestoreReport::default(),
        };
        let stats = storage::load_all(self.storage.as_ref(), &mut rehydrator).await?;

        let mut report = rehydrator.report;
        report.invalid += stats.unreadable;
        tracing::info!(
            collections = report.collections,
            artifacts = report.artifacts,
            unknown_factory = report.unknown_factory,
            invalid = report.invalid,
            "restore finished"
        );
        Ok(report)
    }
}

struct Rehydrator<'a> {
    registry: &'a Registry,
    report: RestoreReport,
}

impl ArtifactLoadedCallback for Rehydrator<'_> {
    fn collection_loaded(&mut self, collection: Collection) {
        self.registry.insert_collection(collection);
        self.report.collections += 1;
    }

    fn artifact_loaded(
        &mut self,
        owner: Option<UserId>,
        collection: Option<CollectionId>,
        artifact: PersistedArtifact,
    ) {
        let id = artifact.record.id();
        match self.registry.rehydrate(artifact) {
            Ok(_) => {
                self.report.artifacts += 1;
                tracing::debug!(artifact = %id, owner = ?owner, collection = ?collection, "restored");
            }
            Err(RegistryError::FactoryNotFound(factory)) => {
                self.report.unknown_factory += 1;
                tracing::warn!(artifact = %id, %factory, "skipping artifact with unknown factory");
            }
            Err(error) => {
                self.report.invalid += 1;
                tracing::warn!(artifact = %id, %error, "skipping artifact that failed to restore");
            }
        }
    }
}
