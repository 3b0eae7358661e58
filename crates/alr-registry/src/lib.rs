//! ALR Registry
//!
//! Live artifacts, the lifecycle controller that applies post-action
//! decisions, and TTL eviction.
//!
//! # Core Concepts
//!
//! - [`Registry`]: sharded tables of live artifacts and collections
//! - [`ArtifactSlot`]: one artifact behind a single-writer async mutex
//! - [`LifecycleController`]: `none` / `touch` / `persist` / `background`
//! - [`ArtifactFactory`] / [`ArtifactBehavior`]: domain ports
//! - [`StoragePort`]: byte-stream persistence, walked by [`load_all`]
//!
//! # Concurrency
//!
//! Operations on one artifact queue on its mutex; different artifacts never
//! contend. An artifact in background rejects operations with
//! [`RegistryError::Busy`] until its worker reports.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod behavior;
mod collection;
mod error;
mod eviction;
mod lifecycle;
mod registry;
mod restore;
mod slot;
mod storage;

pub use behavior::{ArtifactBehavior, ArtifactFactory, BehaviorError, Operation};
pub use collection::{Collection, CollectionFactory, DefaultCollectionFactory};
pub use error::RegistryError;
pub use eviction::SweepReport;
pub use lifecycle::LifecycleController;
pub use registry::{Registry, RegistryConfig};
pub use restore::RestoreReport;
pub use slot::{ArtifactCell, ArtifactSlot, CollectionSlot, SlotSnapshot};
pub use storage::{
    load_all, ArtifactLoadedCallback, InMemoryStorage, LoadStats, PersistedArtifact,
    StorageError, StorageKey, StoragePort,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
