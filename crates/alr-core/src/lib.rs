//! ALR Core
//!
//! Shared vocabulary for the Artifact Lifecycle Runtime.
//!
//! # Core Concepts
//!
//! - [`ArtifactId`], [`CollectionId`]: runtime-assigned ULID identifiers
//! - [`StateId`], [`ArtifactTypeId`], [`UserId`]: configuration-supplied names
//! - [`ContentHash`]: Blake3 hash of an artifact's data
//! - [`ArtifactRecord`]: identity, state and data of one live artifact
//! - [`CallMeta`]: per-request metadata from the protocol adapter

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod hash;
mod id;
mod record;

pub use hash::{ContentHash, HashError};
pub use id::{ArtifactId, ArtifactTypeId, CollectionId, StateId, UserId};
pub use record::{ArtifactRecord, CallMeta, Document, RecordError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
