//! The runtime façade
//!
//! Every operation follows the same path: find the artifact (restoring it
//! if needed), lock it, open a call context, run the behavior, apply the
//! post-action decision, and describe the result.

use crate::config::RuntimeConfig;
use crate::description::Description;
use crate::error::RuntimeError;
use crate::output::{OutputCache, OutputKey, OutputWriter};
use crate::users::{InMemoryUserDirectory, User, UserDirectory};
use alr_context::{BackgroundMessage, CallContext, MessageLog};
use alr_core::{
    ArtifactId, ArtifactRecord, ArtifactTypeId, CallMeta, CollectionId, Document, StateId, UserId,
};
use alr_graph::TransitionEngine;
use alr_registry::{
    ArtifactFactory, ArtifactSlot, BehaviorError, Collection, CollectionFactory, InMemoryStorage,
    Operation, Registry, RegistryError, RestoreReport, StoragePort,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Assembles a [`Runtime`]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    engine: Option<TransitionEngine>,
    storage: Option<Arc<dyn StoragePort>>,
    users: Option<Arc<dyn UserDirectory>>,
    collection_factory: Option<Arc<dyn CollectionFactory>>,
    factories: Vec<Arc<dyn ArtifactFactory>>,
}

impl RuntimeBuilder {
    /// Use a prebuilt engine instead of `[[artifact_types]]`
    #[must_use]
    pub fn engine(mut self, engine: TransitionEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Defaults to [`InMemoryStorage`]
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn StoragePort>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Defaults to [`InMemoryUserDirectory`]
    #[must_use]
    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    /// Register a collection factory under its name
    #[must_use]
    pub fn collection_factory(mut self, factory: Arc<dyn CollectionFactory>) -> Self {
        self.collection_factory = Some(factory);
        self
    }

    /// Register an artifact factory under its name
    #[must_use]
    pub fn factory(mut self, factory: Arc<dyn ArtifactFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// # Errors
    /// Invalid configuration or state graphs.
    pub fn build(self) -> Result<Runtime, RuntimeError> {
        self.config.validate()?;
        let engine = match self.engine {
            Some(engine) => engine,
            None => self.config.build_engine()?,
        };
        for artifact_type in engine.catalog().artifact_types() {
            let unreachable = engine.unreachable_states(artifact_type);
            if !unreachable.is_empty() {
                tracing::warn!(%artifact_type, ?unreachable, "states unreachable from the initial state");
            }
        }

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));
        let mut registry = Registry::new(Arc::new(engine), storage, self.config.registry_config());
        if let Some(factory) = self.collection_factory {
            registry = registry.with_collection_factory(factory);
        }
        for factory in self.factories {
            registry.register_factory(factory);
        }

        Ok(Runtime {
            outputs: OutputCache::new(self.config.output_cache_capacity),
            users: self
                .users
                .unwrap_or_else(|| Arc::new(InMemoryUserDirectory::new())),
            registry: Arc::new(registry),
            config: self.config,
        })
    }
}

/// Artifact Lifecycle Runtime
pub struct Runtime {
    config: RuntimeConfig,
    registry: Arc<Registry>,
    outputs: OutputCache,
    users: Arc<dyn UserDirectory>,
}

impl Runtime {
    /// Start building a runtime from `config`
    #[must_use]
    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            engine: None,
            storage: None,
            users: None,
            collection_factory: None,
            factories: Vec::new(),
        }
    }

    /// Effective configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Underlying registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Transition engine shared with the registry
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &TransitionEngine {
        self.registry.engine()
    }

    /// Cache of rendered outputs
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &OutputCache {
        &self.outputs
    }

    /// Start the periodic TTL sweep
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        self.registry.start_sweeper()
    }

    fn context(&self, meta: &CallMeta, messages: MessageLog) -> CallContext {
        CallContext::new(meta.clone(), messages)
            .with_default_action(self.config.default_post_action)
            .with_max_provider_depth(self.config.max_provider_depth)
    }

    fn reachable_ids(&self, record: &ArtifactRecord) -> Vec<StateId> {
        let engine = self.engine();
        engine
            .state(record.artifact_type(), record.state())
            .map(|state| {
                engine
                    .reachable_states(record, state)
                    .into_iter()
                    .map(|s| s.id().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn description(
        &self,
        slot: &ArtifactSlot,
        record: &ArtifactRecord,
        body: Option<Document>,
    ) -> Description {
        let in_background = slot.is_in_background();
        Description {
            id: slot.id(),
            artifact_type: record.artifact_type().clone(),
            state: record.state().clone(),
            hash: record.hash(),
            in_background,
            reachable_states: if in_background {
                Vec::new()
            } else {
                self.reachable_ids(record)
            },
            messages: slot.messages().peek(),
            body,
        }
    }

    /// Status of an artifact in background, read without its lock
    fn background_snapshot(slot: &ArtifactSlot) -> Description {
        let snapshot = slot.snapshot();
        Description {
            id: slot.id(),
            artifact_type: slot.artifact_type().clone(),
            state: snapshot.state,
            hash: snapshot.hash,
            in_background: true,
            reachable_states: Vec::new(),
            messages: slot.messages().peek(),
            body: None,
        }
    }

    /// Map a behavior failure. Work the behavior already handed to the
    /// background still pins the artifact until its ticket reports.
    async fn failed(
        &self,
        slot: &Arc<ArtifactSlot>,
        record: &ArtifactRecord,
        cx: &CallContext,
        error: BehaviorError,
    ) -> RuntimeError {
        if cx.is_in_background() {
            tracing::warn!(artifact = %slot.id(), %error, "operation failed after going to background");
            if let Err(finish) = self.registry.lifecycle().finish(slot, record, cx).await {
                return finish.into();
            }
        }
        error.into()
    }

    // === Artifact operations ===

    /// Create an artifact in its type's initial state
    ///
    /// # Errors
    /// Unknown factory, failing factory or behavior.
    #[tracing::instrument(skip(self, meta, input), fields(request = ?meta.request_id))]
    pub async fn create(
        &self,
        factory: &str,
        meta: &CallMeta,
        input: &Document,
    ) -> Result<(ArtifactId, Description), RuntimeError> {
        let cx = self.context(meta, MessageLog::new());
        let slot = self.registry.create(factory, &cx, input).await?;
        let mut record = slot.acquire().await?;
        let body = match slot
            .behavior()
            .describe(Operation::new(&mut record, &cx, Arc::clone(slot.cell())), &Document::Null)
            .await
        {
            Ok(body) => body,
            Err(error) => return Err(self.failed(&slot, &record, &cx, error).await),
        };
        self.registry.lifecycle().finish(&slot, &record, &cx).await?;
        Ok((slot.id(), self.description(&slot, &record, Some(body))))
    }

    /// Describe an artifact. While it is in background the behavior is not
    /// called and a status snapshot is returned instead.
    ///
    /// # Errors
    /// Unknown artifact or a failing behavior.
    #[tracing::instrument(skip(self, input, meta), fields(request = ?meta.request_id))]
    pub async fn describe(
        &self,
        id: ArtifactId,
        input: &Document,
        meta: &CallMeta,
    ) -> Result<Description, RuntimeError> {
        let slot = self.registry.get(id).await?;
        let mut record = match slot.acquire().await {
            Ok(record) => record,
            Err(RegistryError::Busy(_)) => return Ok(Self::background_snapshot(&slot)),
            Err(error) => return Err(error.into()),
        };
        let cx = self.context(meta, slot.messages().clone());
        let body = match slot
            .behavior()
            .describe(Operation::new(&mut record, &cx, Arc::clone(slot.cell())), input)
            .await
        {
            Ok(body) => body,
            Err(error) => return Err(self.failed(&slot, &record, &cx, error).await),
        };
        self.registry.lifecycle().finish(&slot, &record, &cx).await?;
        Ok(self.description(&slot, &record, Some(body)))
    }

    /// Move an artifact to `target`.
    ///
    /// The target must be reachable now. The state changes only after the
    /// behavior's advance succeeds.
    ///
    /// # Errors
    /// [`RuntimeError::IllegalTransition`], busy, unknown artifact, or a
    /// failing behavior.
    #[tracing::instrument(skip(self, meta), fields(request = ?meta.request_id))]
    pub async fn advance(
        &self,
        id: ArtifactId,
        target: &StateId,
        meta: &CallMeta,
    ) -> Result<Description, RuntimeError> {
        let slot = self.registry.get(id).await?;
        let mut record = slot.acquire().await?;

        let engine = Arc::clone(self.registry.engine());
        let illegal = || RuntimeError::IllegalTransition {
            artifact: id,
            from: record.state().clone(),
            to: target.clone(),
        };
        let from = engine
            .state(record.artifact_type(), record.state())
            .ok_or_else(illegal)?;
        if !engine.is_state_reachable(&record, target, from) {
            return Err(illegal());
        }
        let to = engine
            .state(record.artifact_type(), target)
            .ok_or_else(illegal)?;

        let cx = self.context(meta, slot.messages().clone());
        if let Err(error) = slot
            .behavior()
            .advance(Operation::new(&mut record, &cx, Arc::clone(slot.cell())), from, to)
            .await
        {
            return Err(self.failed(&slot, &record, &cx, error).await);
        }
        record.commit_transition(target.clone());
        tracing::info!(artifact = %id, from = %from.id(), to = %target, "advanced");

        self.registry.lifecycle().finish(&slot, &record, &cx).await?;
        Ok(self.description(&slot, &record, None))
    }

    /// Hand input to an artifact
    ///
    /// # Errors
    /// Busy, unknown artifact, or a failing behavior.
    #[tracing::instrument(skip(self, input, meta), fields(request = ?meta.request_id))]
    pub async fn feed(
        &self,
        id: ArtifactId,
        input: Document,
        meta: &CallMeta,
    ) -> Result<Description, RuntimeError> {
        let slot = self.registry.get(id).await?;
        let mut record = slot.acquire().await?;
        let cx = self.context(meta, slot.messages().clone());
        if let Err(error) = slot
            .behavior()
            .feed(Operation::new(&mut record, &cx, Arc::clone(slot.cell())), input)
            .await
        {
            return Err(self.failed(&slot, &record, &cx, error).await);
        }
        self.registry.lifecycle().finish(&slot, &record, &cx).await?;
        Ok(self.description(&slot, &record, None))
    }

    /// Produce an output. An unchanged content hash serves the cached output
    /// without calling the behavior.
    ///
    /// # Errors
    /// Busy, unknown artifact, unsupported output, or a failing behavior.
    #[tracing::instrument(skip(self, meta), fields(request = ?meta.request_id))]
    pub async fn out(
        &self,
        id: ArtifactId,
        output_type: &str,
        format: &str,
        meta: &CallMeta,
    ) -> Result<OutputWriter, RuntimeError> {
        let slot = self.registry.get(id).await?;
        let mut record = slot.acquire().await?;
        let cx = self.context(meta, slot.messages().clone());

        let key = OutputKey::new(id, record.hash(), output_type, format);
        if let Some(bytes) = self.outputs.get(&key).await {
            tracing::debug!(artifact = %id, output_type, format, "output cache hit");
            self.registry.lifecycle().finish(&slot, &record, &cx).await?;
            return Ok(OutputWriter::new(bytes, true));
        }

        let produced = match slot
            .behavior()
            .produce_output(
                Operation::new(&mut record, &cx, Arc::clone(slot.cell())),
                output_type,
                format,
            )
            .await
        {
            Ok(produced) => produced,
            Err(error) => return Err(self.failed(&slot, &record, &cx, error).await),
        };
        let bytes: Arc<[u8]> = Arc::from(produced);
        let key = OutputKey::new(id, record.hash(), output_type, format);
        self.outputs.insert(key, Arc::clone(&bytes)).await;

        self.registry.lifecycle().finish(&slot, &record, &cx).await?;
        Ok(OutputWriter::new(bytes, false))
    }

    /// Delete an artifact, running its end-of-life and cleanup hooks
    ///
    /// # Errors
    /// Busy or unknown artifact, or a storage failure.
    pub async fn delete_artifact(&self, id: ArtifactId) -> Result<(), RuntimeError> {
        Ok(self.registry.delete_artifact(id).await?)
    }

    /// Take all background messages of an artifact
    ///
    /// # Errors
    /// Unknown artifact.
    pub async fn drain_messages(&self, id: ArtifactId) -> Result<Vec<BackgroundMessage>, RuntimeError> {
        let slot = self.registry.get(id).await?;
        Ok(slot.messages().drain())
    }

    /// States `advance` would accept now
    ///
    /// # Errors
    /// Busy or unknown artifact.
    pub async fn reachable_states(&self, id: ArtifactId) -> Result<Vec<StateId>, RuntimeError> {
        let slot = self.registry.get(id).await?;
        let record = slot.acquire().await?;
        Ok(self.reachable_ids(&record))
    }

    /// Every state structurally reachable from `state`, ignoring guards
    #[must_use]
    pub fn successor_states(&self, artifact_type: &ArtifactTypeId, state: &StateId) -> BTreeSet<StateId> {
        self.engine().all_recursive_successor_state_ids(artifact_type, state)
    }

    /// Restore everything in storage
    ///
    /// # Errors
    /// Storage backend failures.
    pub async fn load_all_artifacts(&self) -> Result<RestoreReport, RuntimeError> {
        Ok(self.registry.load_all_artifacts().await?)
    }

    // === Collection operations ===

    /// # Errors
    /// [`RuntimeError::UnknownUser`] for an owner missing from the directory,
    /// or a storage failure.
    pub async fn create_collection(
        &self,
        owner: &UserId,
        name: &str,
        attributes: serde_json::Map<String, Document>,
    ) -> Result<Collection, RuntimeError> {
        self.get_user(owner).await?;
        Ok(self
            .registry
            .create_collection(name, owner.clone(), attributes)
            .await?)
    }

    /// # Errors
    /// Unknown collection.
    pub async fn describe_collection(&self, id: CollectionId) -> Result<Collection, RuntimeError> {
        Ok(self.registry.collection(id).await?.snapshot())
    }

    /// Member artifacts are not deleted
    ///
    /// # Errors
    /// Unknown collection or a storage failure.
    pub async fn delete_collection(&self, id: CollectionId) -> Result<Collection, RuntimeError> {
        Ok(self.registry.delete_collection(id).await?)
    }

    /// # Errors
    /// Unknown collection or a storage failure.
    pub async fn set_collection_attribute(
        &self,
        id: CollectionId,
        key: &str,
        value: Document,
    ) -> Result<Collection, RuntimeError> {
        Ok(self.registry.set_collection_attribute(id, key, value).await?)
    }

    /// # Errors
    /// Unknown collection, an artifact that is already gone, or a storage
    /// failure.
    pub async fn add_item(
        &self,
        id: CollectionId,
        artifact: ArtifactId,
        attributes: Document,
    ) -> Result<bool, RuntimeError> {
        Ok(self.registry.add_item(id, artifact, attributes).await?)
    }

    /// # Errors
    /// Unknown collection, non-member, or a storage failure.
    pub async fn remove_item(
        &self,
        id: CollectionId,
        artifact: ArtifactId,
    ) -> Result<Document, RuntimeError> {
        Ok(self.registry.remove_item(id, artifact).await?)
    }

    /// # Errors
    /// Unknown collection.
    pub async fn list_items(
        &self,
        id: CollectionId,
    ) -> Result<Vec<(ArtifactId, Document)>, RuntimeError> {
        Ok(self.registry.list_items(id).await?)
    }

    /// # Errors
    /// Unknown collection or an unsupported output.
    pub async fn collection_out(
        &self,
        id: CollectionId,
        output_type: &str,
        format: &str,
    ) -> Result<OutputWriter, RuntimeError> {
        let slot = self.registry.collection(id).await?;
        let collection = slot.snapshot();
        let bytes = slot
            .factory()
            .produce_output(&collection, output_type, format)
            .await?;
        Ok(OutputWriter::new(Arc::from(bytes), false))
    }

    /// Collections owned by `owner`
    #[must_use]
    pub fn list_collections(&self, owner: &UserId) -> Vec<Collection> {
        self.registry.list_collections(owner)
    }

    // === User operations ===

    /// Insert or replace a user; `true` when the user is new
    pub async fn create_user(&self, user: User) -> bool {
        let id = user.id.clone();
        let created = self.users.upsert(user).await;
        tracing::info!(user = %id, created, "user stored");
        created
    }

    /// # Errors
    /// [`RuntimeError::UnknownUser`]
    pub async fn get_user(&self, id: &UserId) -> Result<User, RuntimeError> {
        self.users
            .get(id)
            .await
            .ok_or_else(|| RuntimeError::UnknownUser(id.clone()))
    }

    /// # Errors
    /// [`RuntimeError::UnknownUser`]
    pub async fn delete_user(&self, id: &UserId) -> Result<User, RuntimeError> {
        self.users
            .remove(id)
            .await
            .ok_or_else(|| RuntimeError::UnknownUser(id.clone()))
    }

    /// Every known user, sorted by id
    pub async fn list_users(&self) -> Vec<User> {
        self.users.list().await
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
