//! The live artifact and collection tables

use crate::behavior::ArtifactFactory;
use crate::collection::{Collection, CollectionFactory, DefaultCollectionFactory};
use crate::error::RegistryError;
use crate::lifecycle::LifecycleController;
use crate::slot::{ArtifactSlot, CollectionSlot};
use crate::storage::{StorageKey, StoragePort};
use alr_context::CallContext;
use alr_core::{ArtifactId, ArtifactRecord, CollectionId, Document, UserId};
use alr_graph::TransitionEngine;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Period of the TTL sweeper
    pub sweep_interval: Duration,
    /// Watchdog for background work; `None` waits forever
    pub background_timeout: Option<Duration>,
    /// TTL given to new collections by the default collection factory
    pub collection_ttl: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            background_timeout: None,
            collection_ttl: None,
        }
    }
}

/// Live artifacts and collections
pub struct Registry {
    pub(crate) config: RegistryConfig,
    pub(crate) engine: Arc<TransitionEngine>,
    pub(crate) storage: Arc<dyn StoragePort>,
    lifecycle: LifecycleController,
    factories: DashMap<String, Arc<dyn ArtifactFactory>>,
    pub(crate) collection_factory: Arc<dyn CollectionFactory>,
    pub(crate) artifacts: DashMap<ArtifactId, Arc<ArtifactSlot>>,
    pub(crate) collections: DashMap<CollectionId, Arc<CollectionSlot>>,
}

impl Registry {
    /// Empty registry over `storage`; `load_all_artifacts` brings back persisted entries
    pub fn new(
        engine: Arc<TransitionEngine>,
        storage: Arc<dyn StoragePort>,
        config: RegistryConfig,
    ) -> Self {
        let lifecycle = LifecycleController::new(Arc::clone(&storage), config.background_timeout);
        Self {
            config,
            engine,
            storage,
            lifecycle,
            factories: DashMap::new(),
            collection_factory: Arc::new(DefaultCollectionFactory),
            artifacts: DashMap::new(),
            collections: DashMap::new(),
        }
    }

    /// Replace the default collection factory
    #[must_use]
    pub fn with_collection_factory(mut self, factory: Arc<dyn CollectionFactory>) -> Self {
        self.collection_factory = factory;
        self
    }

    /// Registry settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Shared transition engine
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<TransitionEngine> {
        &self.engine
    }

    /// Decision applier shared by operations
    #[inline]
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    /// Storage backend
    #[inline]
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn StoragePort> {
        &self.storage
    }

    // === Factories ===

    /// Register a factory under its name, returning the one it replaces
    pub fn register_factory(
        &self,
        factory: Arc<dyn ArtifactFactory>,
    ) -> Option<Arc<dyn ArtifactFactory>> {
        self.factories.insert(factory.name().to_string(), factory)
    }

    /// # Errors
    /// [`RegistryError::FactoryNotFound`]
    pub fn factory(&self, name: &str) -> Result<Arc<dyn ArtifactFactory>, RegistryError> {
        self.factories
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::FactoryNotFound(name.to_string()))
    }

    /// Registered artifact factory names, sorted
    #[must_use]
    pub fn factory_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    // === Artifacts ===

    /// Create an artifact in its type's initial state.
    ///
    /// The owner is the user on the context's metadata; the message log is
    /// the context's.
    ///
    /// # Errors
    /// Unknown factory, a type without a state graph, or a failing factory.
    pub async fn create(
        &self,
        factory_name: &str,
        context: &CallContext,
        input: &Document,
    ) -> Result<Arc<ArtifactSlot>, RegistryError> {
        let factory = self.factory(factory_name)?;
        let initial = self
            .engine
            .initial_state(factory.artifact_type())
            .ok_or_else(|| RegistryError::UnknownArtifactType(factory.artifact_type().clone()))?
            .id()
            .clone();

        let data = factory.create(context, input).await?;
        let record = ArtifactRecord::new(
            ArtifactId::new(),
            factory.artifact_type().clone(),
            factory.name(),
            initial,
            data,
        );
        let ttl = factory.time_to_live_untouched(&record);
        let slot = Arc::new(ArtifactSlot::new(
            record,
            context.meta().user.clone(),
            factory.behavior(),
            ttl,
            context.messages().clone(),
        ));
        self.artifacts.insert(slot.id(), Arc::clone(&slot));

        tracing::info!(
            artifact = %slot.id(),
            factory = factory_name,
            ttl_secs = ttl.map(|d| d.as_secs()),
            "artifact created"
        );
        Ok(slot)
    }

    /// Live entry only; never touches storage
    #[must_use]
    pub fn get_live(&self, id: ArtifactId) -> Option<Arc<ArtifactSlot>> {
        self.artifacts.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Live entry, or restored from storage on a miss
    ///
    /// # Errors
    /// [`RegistryError::UnknownArtifact`] when neither has it.
    pub async fn get(&self, id: ArtifactId) -> Result<Arc<ArtifactSlot>, RegistryError> {
        match self.get_live(id) {
            Some(slot) if slot.is_retired() => Err(RegistryError::UnknownArtifact(id)),
            Some(slot) => Ok(slot),
            None => self.restore_artifact(id).await,
        }
    }

    /// Whether `id` is live in memory (storage is not consulted)
    #[must_use]
    pub fn contains(&self, id: ArtifactId) -> bool {
        self.artifacts.contains_key(&id)
    }

    /// Number of live artifacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether no artifact is live in memory
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Run the artifact's hooks and remove it from the table and storage
    ///
    /// # Errors
    /// Unknown artifact, [`RegistryError::Busy`] while in background, or a
    /// storage failure.
    pub async fn delete_artifact(&self, id: ArtifactId) -> Result<(), RegistryError> {
        let slot = self.get(id).await?;
        let record = slot.acquire().await?;
        self.retire_artifact(&slot, &record).await?;
        tracing::info!(artifact = %id, "artifact deleted");
        Ok(())
    }

    /// Callers hold the record lock, so no operation is running on `slot`
    /// and every queued one fails with [`RegistryError::UnknownArtifact`].
    pub(crate) async fn retire_artifact(
        &self,
        slot: &Arc<ArtifactSlot>,
        record: &ArtifactRecord,
    ) -> Result<(), RegistryError> {
        slot.mark_retired();
        slot.behavior().end_of_life(record).await;
        slot.behavior().cleanup(record).await;
        slot.messages().clear();
        // Storage goes first: a lookup in between finds the retired slot
        // instead of restoring the stored copy.
        let deleted = self.storage.delete(StorageKey::Artifact(slot.id())).await;
        self.artifacts
            .remove_if(&slot.id(), |_, live| Arc::ptr_eq(live, slot));
        deleted?;
        Ok(())
    }

    // === Collections ===

    /// # Errors
    /// Storage failure while writing the new collection.
    pub async fn create_collection(
        &self,
        name: &str,
        owner: UserId,
        attributes: serde_json::Map<String, Document>,
    ) -> Result<Collection, RegistryError> {
        let mut collection = Collection::new(name, owner, self.config.collection_ttl);
        for (key, value) in attributes {
            collection.set_attribute(key, value);
        }
        let slot = Arc::new(CollectionSlot::new(
            collection,
            Arc::clone(&self.collection_factory),
        ));
        let snapshot = slot.snapshot();
        self.save_collection(&snapshot).await?;
        self.collections.insert(snapshot.id(), slot);
        tracing::info!(collection = %snapshot.id(), name, "collection created");
        Ok(snapshot)
    }

    /// Live entry, or restored from storage on a miss. Touches the collection.
    ///
    /// # Errors
    /// [`RegistryError::UnknownCollection`] when neither has it.
    pub async fn collection(&self, id: CollectionId) -> Result<Arc<CollectionSlot>, RegistryError> {
        let live = self.collections.get(&id).map(|entry| Arc::clone(entry.value()));
        let slot = match live {
            Some(slot) => slot,
            None => self.restore_collection(id).await?,
        };
        slot.touch();
        Ok(slot)
    }

    /// Remove a collection. Member artifacts are left alone.
    ///
    /// # Errors
    /// Unknown collection or a storage failure.
    pub async fn delete_collection(&self, id: CollectionId) -> Result<Collection, RegistryError> {
        let slot = self.collection(id).await?;
        let collection = self.retire_collection(&slot).await?;
        tracing::info!(collection = %id, "collection deleted");
        Ok(collection)
    }

    pub(crate) async fn retire_collection(
        &self,
        slot: &Arc<CollectionSlot>,
    ) -> Result<Collection, RegistryError> {
        let collection = slot.snapshot();
        slot.factory().end_of_life(&collection).await;
        slot.factory().cleanup(&collection).await;
        self.collections
            .remove_if(&collection.id(), |_, live| Arc::ptr_eq(live, slot));
        self.storage
            .delete(StorageKey::Collection(collection.id()))
            .await?;
        Ok(collection)
    }

    /// Set one attribute; `null` removes it
    ///
    /// # Errors
    /// Unknown collection or a storage failure.
    pub async fn set_collection_attribute(
        &self,
        id: CollectionId,
        key: &str,
        value: Document,
    ) -> Result<Collection, RegistryError> {
        let slot = self.collection(id).await?;
        let snapshot = slot.update(|c| {
            c.set_attribute(key, value);
            c.clone()
        });
        self.save_collection(&snapshot).await?;
        Ok(snapshot)
    }

    /// Add or update an item. Returns `true` for a new member.
    ///
    /// # Errors
    /// Unknown collection, an artifact that is already gone, or a storage
    /// failure.
    pub async fn add_item(
        &self,
        id: CollectionId,
        artifact: ArtifactId,
        attributes: Document,
    ) -> Result<bool, RegistryError> {
        let slot = self.collection(id).await?;
        self.get(artifact).await?;
        let (added, snapshot) = slot.update(|c| (c.add_item(artifact, attributes), c.clone()));
        self.save_collection(&snapshot).await?;
        Ok(added)
    }

    /// Remove an item, returning its attributes. The artifact itself stays.
    ///
    /// # Errors
    /// Unknown collection, [`RegistryError::UnknownArtifact`] for a
    /// non-member, or a storage failure.
    pub async fn remove_item(
        &self,
        id: CollectionId,
        artifact: ArtifactId,
    ) -> Result<Document, RegistryError> {
        let slot = self.collection(id).await?;
        let (removed, snapshot) = slot.update(|c| (c.remove_item(artifact), c.clone()));
        let attributes = removed.ok_or(RegistryError::UnknownArtifact(artifact))?;
        self.save_collection(&snapshot).await?;
        Ok(attributes)
    }

    /// Items in insertion order
    ///
    /// # Errors
    /// Unknown collection.
    pub async fn list_items(
        &self,
        id: CollectionId,
    ) -> Result<Vec<(ArtifactId, Document)>, RegistryError> {
        let slot = self.collection(id).await?;
        let collection = slot.snapshot();
        Ok(collection
            .items()
            .iter()
            .map(|(id, attributes)| (*id, attributes.clone()))
            .collect())
    }

    /// Resolve a member artifact.
    ///
    /// # Errors
    /// [`RegistryError::UnknownArtifact`] for a non-member or a member that
    /// is already gone.
    pub async fn member(
        &self,
        id: CollectionId,
        artifact: ArtifactId,
    ) -> Result<Arc<ArtifactSlot>, RegistryError> {
        let slot = self.collection(id).await?;
        if !slot.snapshot().contains(artifact) {
            return Err(RegistryError::UnknownArtifact(artifact));
        }
        self.get(artifact).await
    }

    /// Live collections owned by `owner`, oldest first
    #[must_use]
    pub fn list_collections(&self, owner: &UserId) -> Vec<Collection> {
        let mut owned: Vec<Collection> = self
            .collections
            .iter()
            .map(|entry| entry.value().snapshot())
            .filter(|c| c.owner() == owner)
            .collect();
        owned.sort_by_key(Collection::created_at);
        owned
    }

    async fn save_collection(&self, collection: &Collection) -> Result<(), RegistryError> {
        let bytes = serde_json::to_vec(collection)?;
        self.storage
            .save(StorageKey::Collection(collection.id()), bytes)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("artifacts", &self.artifacts.len())
            .field("collections", &self.collections.len())
            .field("factories", &self.factory_names())
            .finish_non_exhaustive()
    }
}
