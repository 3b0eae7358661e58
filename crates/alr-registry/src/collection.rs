//! Collections
//!
//! A named, user-owned, insertion-ordered set of artifact references with
//! per-item attributes. Collections reference artifacts; they never own them.

use crate::behavior::BehaviorError;
use alr_core::{ArtifactId, CollectionId, Document, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    id: CollectionId,
    name: String,
    owner: UserId,
    created_at: DateTime<Utc>,
    ttl: Option<Duration>,
    attributes: serde_json::Map<String, Document>,
    items: IndexMap<ArtifactId, Document>,
}

impl Collection {
    /// Empty collection with a fresh id
    pub fn new(name: impl Into<String>, owner: UserId, ttl: Option<Duration>) -> Self {
        Self {
            id: CollectionId::new(),
            name: name.into(),
            owner,
            created_at: Utc::now(),
            ttl,
            attributes: serde_json::Map::new(),
            items: IndexMap::new(),
        }
    }

    /// Collection id
    #[inline]
    #[must_use]
    pub fn id(&self) -> CollectionId {
        self.id
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning user
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    /// Creation time
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Idle time before the sweep evicts it
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Factory-defined attributes
    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &serde_json::Map<String, Document> {
        &self.attributes
    }

    /// Items in insertion order
    #[inline]
    #[must_use]
    pub fn items(&self) -> &IndexMap<ArtifactId, Document> {
        &self.items
    }

    /// Set one attribute; `null` removes it
    pub fn set_attribute(&mut self, key: impl Into<String>, value: Document) {
        let key = key.into();
        if value.is_null() {
            self.attributes.remove(&key);
        } else {
            self.attributes.insert(key, value);
        }
    }

    /// Add or update an item. Re-adding keeps the original position.
    ///
    /// Returns `true` when the artifact was not yet a member.
    pub fn add_item(&mut self, artifact: ArtifactId, attributes: Document) -> bool {
        self.items.insert(artifact, attributes).is_none()
    }

    /// Remove `artifact`, returning its item data
    pub fn remove_item(&mut self, artifact: ArtifactId) -> Option<Document> {
        self.items.shift_remove(&artifact)
    }

    /// Whether `artifact` is a member
    #[must_use]
    pub fn contains(&self, artifact: ArtifactId) -> bool {
        self.items.contains_key(&artifact)
    }
}

/// TTL policy, hooks and outputs shared by all collections
#[async_trait]
pub trait CollectionFactory: Send + Sync {
    /// Asked once, at creation or restore
    fn time_to_live_untouched(&self, collection: &Collection) -> Option<Duration> {
        collection.ttl()
    }

    async fn end_of_life(&self, _collection: &Collection) {}

    async fn cleanup(&self, _collection: &Collection) {}

    /// Only `("items", "json")` by default
    async fn produce_output(
        &self,
        collection: &Collection,
        output_type: &str,
        format: &str,
    ) -> Result<Vec<u8>, BehaviorError> {
        match (output_type, format) {
            ("items", "json") => {
                let items: Vec<_> = collection
                    .items()
                    .iter()
                    .map(|(id, attributes)| serde_json::json!({"artifact": id, "attributes": attributes}))
                    .collect();
                Ok(serde_json::to_vec(&items)?)
            }
            _ => Err(BehaviorError::unsupported_output(output_type, format)),
        }
    }
}

/// Factory with the stock behavior
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCollectionFactory;

impl CollectionFactory for DefaultCollectionFactory {}
