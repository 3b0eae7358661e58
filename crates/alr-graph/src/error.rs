//! Error types for graph construction
//!
//! Lookups on a built engine never fail; these errors only arise while
//! loading state graphs and transitions.

use alr_core::{ArtifactTypeId, StateId};

/// Graph construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A state id was declared twice for one type
    #[error("state {state} declared twice for artifact type {artifact_type}")]
    DuplicateState {
        artifact_type: ArtifactTypeId,
        state: StateId,
    },

    /// A configured transition names an undeclared state
    #[error("transition for artifact type {artifact_type} references unknown state {state}")]
    UnknownState {
        artifact_type: ArtifactTypeId,
        state: StateId,
    },

    /// An artifact type was configured twice
    #[error("artifact type {0} configured twice")]
    DuplicateType(ArtifactTypeId),
}
