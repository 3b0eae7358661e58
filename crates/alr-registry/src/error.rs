//! Error types for the registry and lifecycle controller

use crate::behavior::BehaviorError;
use crate::storage::StorageError;
use alr_core::{ArtifactId, ArtifactTypeId, CollectionId, RecordError};

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Not live and not in storage
    #[error("unknown artifact: {0}")]
    UnknownArtifact(ArtifactId),

    /// Not live and not in storage
    #[error("unknown collection: {0}")]
    UnknownCollection(CollectionId),

    /// The artifact is pinned by background work
    #[error("artifact {0} is busy in background")]
    Busy(ArtifactId),

    /// No factory registered under this name
    #[error("factory not found: {0}")]
    FactoryNotFound(String),

    /// A factory produces a type without a state graph
    #[error("no state graph for artifact type {0}")]
    UnknownArtifactType(ArtifactTypeId),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persisted bytes could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A restored record failed its integrity check
    #[error("corrupt record: {0}")]
    Record(#[from] RecordError),

    /// Domain code failed
    #[error(transparent)]
    Behavior(#[from] BehaviorError),
}

impl RegistryError {
    /// Whether retrying the same call later can succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Busy(_) | RegistryError::Storage(_))
    }
}
