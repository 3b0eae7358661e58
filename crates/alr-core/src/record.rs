//! Artifact records and call metadata
//!
//! [`ArtifactRecord`] is the runtime's view of one live artifact: identity,
//! current state, opaque data, and the content hash of that data.

use crate::hash::ContentHash;
use crate::id::{ArtifactId, ArtifactTypeId, StateId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured document exchanged with protocol adapters.
pub type Document = serde_json::Value;

/// Errors raised while handling artifact records
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Stored hash does not match the stored data (integrity check failed)
    #[error("hash mismatch for artifact {id}: expected {expected}, got {actual}")]
    HashMismatch {
        id: ArtifactId,
        expected: ContentHash,
        actual: ContentHash,
    },
}

/// A live artifact's identity, state and data
///
/// # Invariants
/// - `hash` is always `ContentHash::of_document(&data)`
/// - `state` only changes through [`ArtifactRecord::commit_transition`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    id: ArtifactId,
    artifact_type: ArtifactTypeId,
    factory: String,
    state: StateId,
    data: Document,
    hash: ContentHash,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Create a record in its creation state
    pub fn new(
        id: ArtifactId,
        artifact_type: ArtifactTypeId,
        factory: impl Into<String>,
        initial_state: StateId,
        data: Document,
    ) -> Self {
        let hash = ContentHash::of_document(&data);
        Self {
            id,
            artifact_type,
            factory: factory.into(),
            state: initial_state,
            data,
            hash,
            created_at: Utc::now(),
        }
    }

    /// Artifact id, fixed at creation
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

    /// Name of the factory that created this artifact
    #[inline]
    #[must_use]
    pub fn factory(&self) -> &str {
        &self.factory
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> &StateId {
        &self.state
    }

    /// Behavior-owned data
    #[inline]
    #[must_use]
    pub fn data(&self) -> &Document {
        &self.data
    }

    /// Content hash over state and data
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Creation time
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Look up a data field.
    ///
    /// A field starting with `/` is a JSON pointer; anything else is a
    /// top-level object key.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&Document> {
        if field.starts_with('/') {
            self.data.pointer(field)
        } else {
            self.data.get(field)
        }
    }

    /// Replace the data. The hash moves only if the content differs.
    pub fn set_data(&mut self, data: Document) {
        self.data = data;
        self.hash = ContentHash::of_document(&self.data);
    }

    /// Mutate the data in place and rehash.
    pub fn update_data<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Document),
    {
        f(&mut self.data);
        self.hash = ContentHash::of_document(&self.data);
    }

    /// Move to `to`. Only the runtime calls this, after the transition
    /// passed the reachability check.
    pub fn commit_transition(&mut self, to: StateId) {
        self.state = to;
    }

    /// Check the stored hash against the data (after deserialization).
    ///
    /// # Errors
    /// Returns [`RecordError::HashMismatch`] when they disagree
    pub fn verify(&self) -> Result<(), RecordError> {
        let actual = ContentHash::of_document(&self.data);
        if actual == self.hash {
            Ok(())
        } else {
            Err(RecordError::HashMismatch {
                id: self.id,
                expected: self.hash,
                actual,
            })
        }
    }
}

/// Per-request metadata supplied by the protocol adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallMeta {
    /// Authenticated caller, if any
    pub user: Option<UserId>,
    /// Adapter-assigned request id, used in log spans
    pub request_id: Option<String>,
    /// Free-form adapter attributes (locale, client version, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, Document>,
}

impl CallMeta {
    /// Anonymous call with no request id
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the calling user
    #[must_use]
    pub fn with_user(mut self, user: impl Into<UserId>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Attach a request id for log correlation
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
