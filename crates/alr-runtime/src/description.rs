//! Structured operation results

use alr_context::BackgroundMessage;
use alr_core::{ArtifactId, ArtifactTypeId, ContentHash, Document, StateId};
use serde::{Deserialize, Serialize};

/// What a client learns about an artifact after an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub id: ArtifactId,
    pub artifact_type: ArtifactTypeId,
    pub state: StateId,
    pub hash: ContentHash,
    pub in_background: bool,
    /// States `advance` would accept now; empty while in background
    pub reachable_states: Vec<StateId>,
    /// Background messages, left in place
    pub messages: Vec<BackgroundMessage>,
    /// Behavior's own description, for `create` and `describe`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Document>,
}
