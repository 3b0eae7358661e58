//! Registry entries

use crate::behavior::ArtifactBehavior;
use crate::collection::{Collection, CollectionFactory};
use crate::error::RegistryError;
use alr_context::MessageLog;
use alr_core::{ArtifactId, ArtifactRecord, ArtifactTypeId, ContentHash, StateId, UserId};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::MutexGuard;
use tokio::time::Instant;

/// Single-writer cell around a live record
pub type ArtifactCell = Arc<tokio::sync::Mutex<ArtifactRecord>>;

/// State and hash as of the last finished operation, readable without the record lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub state: StateId,
    pub hash: ContentHash,
}

fn expired(last_access: Instant, ttl: Option<Duration>, now: Instant) -> bool {
    ttl.is_some_and(|ttl| now.saturating_duration_since(last_access) > ttl)
}

/// One live artifact
pub struct ArtifactSlot {
    id: ArtifactId,
    artifact_type: ArtifactTypeId,
    owner: Option<UserId>,
    record: ArtifactCell,
    behavior: Arc<dyn ArtifactBehavior>,
    ttl: Option<Duration>,
    last_access: Mutex<Instant>,
    in_background: AtomicBool,
    retired: AtomicBool,
    messages: MessageLog,
    snapshot: RwLock<SlotSnapshot>,
}

impl ArtifactSlot {
    pub(crate) fn new(
        record: ArtifactRecord,
        owner: Option<UserId>,
        behavior: Arc<dyn ArtifactBehavior>,
        ttl: Option<Duration>,
        messages: MessageLog,
    ) -> Self {
        let snapshot = SlotSnapshot {
            state: record.state().clone(),
            hash: record.hash(),
        };
        Self {
            id: record.id(),
            artifact_type: record.artifact_type().clone(),
            owner,
            record: Arc::new(tokio::sync::Mutex::new(record)),
            behavior,
            ttl,
            last_access: Mutex::new(Instant::now()),
            in_background: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            messages,
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Artifact id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ArtifactId {
        self.id
    }

    /// Type of the artifact
    #[inline]
    #[must_use]
    pub fn artifact_type(&self) -> &ArtifactTypeId {
        &self.artifact_type
    }

    /// Creating user, if any
    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<&UserId> {
        self.owner.as_ref()
    }

    /// Lock cell around the record
    #[inline]
    #[must_use]
    pub fn cell(&self) -> &ArtifactCell {
        &self.record
    }

    /// Behavior bound at creation or restore
    #[inline]
    #[must_use]
    pub fn behavior(&self) -> &Arc<dyn ArtifactBehavior> {
        &self.behavior
    }

    /// Idle time before eviction; `None` never expires
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Messages left for the caller by background work
    #[inline]
    #[must_use]
    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    /// Last committed view, readable while the record is locked
    #[must_use]
    pub fn snapshot(&self) -> SlotSnapshot {
        self.snapshot.read().clone()
    }

    pub(crate) fn refresh_snapshot(&self, record: &ArtifactRecord) {
        *self.snapshot.write() = SlotSnapshot {
            state: record.state().clone(),
            hash: record.hash(),
        };
    }

    /// Whether background work pins this artifact
    #[inline]
    #[must_use]
    pub fn is_in_background(&self) -> bool {
        self.in_background.load(Ordering::Acquire)
    }

    pub(crate) fn set_in_background(&self, value: bool) {
        self.in_background.store(value, Ordering::Release);
    }

    /// Whether this slot was deleted or evicted. A retired slot may still be
    /// referenced by callers that looked it up before it was removed.
    #[inline]
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Must be called with the record lock held
    pub(crate) fn mark_retired(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Refresh the last-access instant
    pub fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    /// Instant of the last touch or persist
    #[must_use]
    pub fn last_access(&self) -> Instant {
        *self.last_access.lock()
    }

    /// Idle longer than the TTL as of `now`. Ignores the background flag.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        expired(self.last_access(), self.ttl, now)
    }

    /// Lock the record for an operation.
    ///
    /// Checked before and after waiting: a call queued behind an operation
    /// that went to background fails instead of running, and a call queued
    /// behind a delete or eviction finds the artifact gone.
    ///
    /// # Errors
    /// [`RegistryError::Busy`] while the artifact is in background,
    /// [`RegistryError::UnknownArtifact`] once the slot is retired.
    pub async fn acquire(&self) -> Result<MutexGuard<'_, ArtifactRecord>, RegistryError> {
        self.check_usable()?;
        let guard = self.record.lock().await;
        self.check_usable()?;
        Ok(guard)
    }

    fn check_usable(&self) -> Result<(), RegistryError> {
        if self.is_retired() {
            return Err(RegistryError::UnknownArtifact(self.id));
        }
        if self.is_in_background() {
            return Err(RegistryError::Busy(self.id));
        }
        Ok(())
    }
}

impl fmt::Debug for ArtifactSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactSlot")
            .field("id", &self.id)
            .field("artifact_type", &self.artifact_type)
            .field("ttl", &self.ttl)
            .field("in_background", &self.is_in_background())
            .finish_non_exhaustive()
    }
}

/// One live collection
pub struct CollectionSlot {
    collection: RwLock<Collection>,
    factory: Arc<dyn CollectionFactory>,
    ttl: Option<Duration>,
    last_access: Mutex<Instant>,
}

impl CollectionSlot {
    pub(crate) fn new(collection: Collection, factory: Arc<dyn CollectionFactory>) -> Self {
        let ttl = factory.time_to_live_untouched(&collection);
        Self {
            collection: RwLock::new(collection),
            factory,
            ttl,
            last_access: Mutex::new(Instant::now()),
        }
    }

    /// Copy of the current collection
    #[must_use]
    pub fn snapshot(&self) -> Collection {
        self.collection.read().clone()
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Collection) -> R) -> R {
        f(&mut *self.collection.write())
    }

    /// Factory that built the collection
    #[inline]
    #[must_use]
    pub fn factory(&self) -> &Arc<dyn CollectionFactory> {
        &self.factory
    }

    /// Idle time before eviction
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Reset the idle clock
    pub fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    /// Whether the idle time exceeded the ttl at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        expired(*self.last_access.lock(), self.ttl, now)
    }
}

impl fmt::Debug for CollectionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSlot")
            .field("collection", &*self.collection.read())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
