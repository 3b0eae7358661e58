//! Storage port
//!
//! The registry persists artifacts and collections as JSON byte streams
//! through a [`StoragePort`]. Backends only move bytes; encoding stays here.

use crate::collection::Collection;
use alr_core::{ArtifactId, ArtifactRecord, CollectionId, UserId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Storage backend failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Address of one persisted byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKey {
    Artifact(ArtifactId),
    Collection(CollectionId),
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKey::Artifact(id) => write!(f, "artifact/{id}"),
            StorageKey::Collection(id) => write!(f, "collection/{id}"),
        }
    }
}

/// Byte-stream storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoragePort: Send + Sync {
    async fn save(&self, key: StorageKey, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// `Ok(None)` when nothing is stored under `key`
    async fn load(&self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: StorageKey) -> Result<(), StorageError>;

    async fn keys(&self) -> Result<Vec<StorageKey>, StorageError>;
}

/// What is written for one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedArtifact {
    pub owner: Option<UserId>,
    pub record: ArtifactRecord,
}

impl PersistedArtifact {
    pub(crate) fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Receives persisted entries during a bulk restore
pub trait ArtifactLoadedCallback: Send {
    fn collection_loaded(&mut self, collection: Collection);

    /// `collection` is the first restored collection listing this artifact
    fn artifact_loaded(
        &mut self,
        owner: Option<UserId>,
        collection: Option<CollectionId>,
        artifact: PersistedArtifact,
    );
}

/// Counters from one [`load_all`] walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub collections: usize,
    pub artifacts: usize,
    /// Entries that vanished or failed to decode
    pub unreadable: usize,
}

/// Walk every key in `storage`: collections first, then artifacts.
///
/// Undecodable entries are logged and skipped.
///
/// # Errors
/// Returns the first backend failure.
pub async fn load_all(
    storage: &dyn StoragePort,
    callback: &mut dyn ArtifactLoadedCallback,
) -> Result<LoadStats, StorageError> {
    let mut keys = storage.keys().await?;
    keys.sort();

    let mut stats = LoadStats::default();
    let mut membership: HashMap<ArtifactId, CollectionId> = HashMap::new();

    for key in &keys {
        let StorageKey::Collection(id) = *key else {
            continue;
        };
        let Some(bytes) = storage.load(*key).await? else {
            stats.unreadable += 1;
            continue;
        };
        match serde_json::from_slice::<Collection>(&bytes) {
            Ok(collection) => {
                for artifact in collection.items().keys() {
                    membership.entry(*artifact).or_insert(id);
                }
                stats.collections += 1;
                callback.collection_loaded(collection);
            }
            Err(error) => {
                tracing::warn!(%key, %error, "skipping unreadable collection");
                stats.unreadable += 1;
            }
        }
    }

    for key in &keys {
        let StorageKey::Artifact(id) = *key else {
            continue;
        };
        let Some(bytes) = storage.load(*key).await? else {
            stats.unreadable += 1;
            continue;
        };
        match PersistedArtifact::decode(&bytes) {
            Ok(artifact) => {
                stats.artifacts += 1;
                callback.artifact_loaded(artifact.owner.clone(), membership.get(&id).copied(), artifact);
            }
            Err(error) => {
                tracing::warn!(%key, %error, "skipping unreadable artifact");
                stats.unreadable += 1;
            }
        }
    }

    Ok(stats)
}

/// Process-local storage
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: DashMap<StorageKey, Vec<u8>>,
}

impl InMemoryStorage {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything is stored under `key`
    #[must_use]
    pub fn contains(&self, key: StorageKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StoragePort for InMemoryStorage {
    async fn save(&self, key: StorageKey, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.entries.insert(key, bytes);
        Ok(())
    }

    async fn load(&self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(&key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: StorageKey) -> Result<(), StorageError> {
        self.entries.remove(&key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<StorageKey>, StorageError> {
        Ok(self.entries.iter().map(|entry| *entry.key()).collect())
    }
}
