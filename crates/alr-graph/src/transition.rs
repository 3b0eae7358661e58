//! Guarded transitions and their configuration form

use crate::guard::{GuardSpec, TransitionGuard};
use alr_core::StateId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A directed, guarded edge between two states of one artifact type
#[derive(Clone)]
pub struct Transition {
    from: StateId,
    to: StateId,
    guard: Arc<dyn TransitionGuard>,
    guard_label: String,
}

impl Transition {
    /// Unconditional transition
    pub fn new(from: impl Into<StateId>, to: impl Into<StateId>) -> Self {
        Self::with_spec(from, to, GuardSpec::Always)
    }

    /// Transition guarded by a configured guard
    pub fn with_spec(from: impl Into<StateId>, to: impl Into<StateId>, spec: GuardSpec) -> Self {
        let guard_label = format!("{spec:?}");
        Self {
            from: from.into(),
            to: to.into(),
            guard: Arc::new(spec),
            guard_label,
        }
    }

    /// Transition guarded by arbitrary code
    pub fn guarded<G>(from: impl Into<StateId>, to: impl Into<StateId>, guard: G) -> Self
    where
        G: TransitionGuard + 'static,
    {
        Self {
            from: from.into(),
            to: to.into(),
            guard: Arc::new(guard),
            guard_label: "custom".to_string(),
        }
    }

    /// Source state
    #[inline]
    #[must_use]
    pub fn from(&self) -> &StateId {
        &self.from
    }

    /// Target state
    #[inline]
    #[must_use]
    pub fn to(&self) -> &StateId {
        &self.to
    }

    /// Guard evaluated before the move
    #[inline]
    #[must_use]
    pub fn guard(&self) -> &dyn TransitionGuard {
        self.guard.as_ref()
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("guard", &self.guard_label)
            .finish()
    }
}

/// One `[[artifact_types.transitions]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionConfig {
    pub from: StateId,
    pub to: StateId,
    #[serde(default)]
    pub guard: GuardSpec,
}

/// One `[[artifact_types.states]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateConfig {
    /// Bare state id
    Id(StateId),
    /// State id with a display label
    Labelled { id: StateId, label: String },
}

impl StateConfig {
    /// State id
    #[must_use]
    pub fn id(&self) -> &StateId {
        match self {
            StateConfig::Id(id) | StateConfig::Labelled { id, .. } => id,
        }
    }

    /// Human-readable label, if configured
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self {
            StateConfig::Id(_) => None,
            StateConfig::Labelled { label, .. } => Some(label),
        }
    }
}

/// One `[[artifact_types]]` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactTypeConfig {
    pub id: alr_core::ArtifactTypeId,
    pub initial_state: StateId,
    #[serde(default)]
    pub states: Vec<StateConfig>,
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,
}
