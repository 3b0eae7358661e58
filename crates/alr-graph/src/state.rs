//! Static state descriptions per artifact type

use crate::error::GraphError;
use alr_core::{ArtifactTypeId, StateId};
use indexmap::IndexMap;
use std::collections::HashMap;

/// A named state of one artifact type. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    id: StateId,
    artifact_type: ArtifactTypeId,
    label: Option<String>,
}

impl State {
    /// State id, unique within its type
    #[inline]
    #[must_use]
    pub fn id(&self) -> &StateId {
        &self.id
    }

    /// Type this state belongs to
    #[inline]
    #[must_use]
    pub fn artifact_type(&self) -> &ArtifactTypeId {
        &self.artifact_type
    }

    /// Human-readable label, if configured
    #[inline]
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// The states of one artifact type plus its creation state
#[derive(Debug, Clone)]
pub struct StateGraph {
    artifact_type: ArtifactTypeId,
    initial: StateId,
    states: IndexMap<StateId, State>,
}

impl StateGraph {
    /// Create a graph whose creation state is `initial`.
    ///
    /// The initial state is declared immediately.
    pub fn new(artifact_type: impl Into<ArtifactTypeId>, initial: impl Into<StateId>) -> Self {
        let artifact_type = artifact_type.into();
        let initial = initial.into();
        let mut states = IndexMap::new();
        states.insert(
            initial.clone(),
            State {
                id: initial.clone(),
                artifact_type: artifact_type.clone(),
                label: None,
            },
        );
        Self {
            artifact_type,
            initial,
            states,
        }
    }

    /// Declare a state
    ///
    /// # Errors
    /// Returns [`GraphError::DuplicateState`] if the id is already declared,
    /// unless it is the initial state being labelled.
    pub fn add_state(
        &mut self,
        id: impl Into<StateId>,
        label: Option<String>,
    ) -> Result<&State, GraphError> {
        let id = id.into();
        if self.states.contains_key(&id) {
            let relabel_initial = id == self.initial && self.states[&id].label.is_none();
            if !relabel_initial {
                return Err(GraphError::DuplicateState {
                    artifact_type: self.artifact_type.clone(),
                    state: id,
                });
            }
        }
        let state = State {
            id: id.clone(),
            artifact_type: self.artifact_type.clone(),
            label,
        };
        // Re-inserting the initial state keeps its position.
        self.states.insert(id.clone(), state);
        Ok(&self.states[&id])
    }

    /// Builder form of [`StateGraph::add_state`] for unlabelled states.
    ///
    /// # Errors
    /// Same as [`StateGraph::add_state`]
    pub fn with_states<I, S>(mut self, ids: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<StateId>,
    {
        for id in ids {
            let id = id.into();
            if id != self.initial {
                self.add_state(id, None)?;
            }
        }
        Ok(self)
    }

    /// Type the graph describes
    #[inline]
    #[must_use]
    pub fn artifact_type(&self) -> &ArtifactTypeId {
        &self.artifact_type
    }

    /// State new artifacts start in
    #[inline]
    #[must_use]
    pub fn initial_state(&self) -> &State {
        // The initial state is inserted by the constructor and never removed.
        &self.states[&self.initial]
    }

    /// Look up a state by id
    #[inline]
    #[must_use]
    pub fn state(&self, id: &StateId) -> Option<&State> {
        self.states.get(id)
    }

    /// Whether `id` is a state of this graph
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &StateId) -> bool {
        self.states.contains_key(id)
    }

    /// States in declaration order
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.values()
    }

    /// Number of states, initial included
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the graph has no states
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// All state graphs, keyed by artifact type
#[derive(Debug, Clone, Default)]
pub struct StateCatalog {
    graphs: HashMap<ArtifactTypeId, StateGraph>,
}

impl StateCatalog {
    /// Empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a graph, replacing any graph for the same type
    pub fn insert(&mut self, graph: StateGraph) -> Option<StateGraph> {
        self.graphs.insert(graph.artifact_type.clone(), graph)
    }

    /// Graph registered for `artifact_type`
    #[must_use]
    pub fn graph(&self, artifact_type: &ArtifactTypeId) -> Option<&StateGraph> {
        self.graphs.get(artifact_type)
    }

    /// Look up a state of `artifact_type`
    #[must_use]
    pub fn state(&self, artifact_type: &ArtifactTypeId, id: &StateId) -> Option<&State> {
        self.graphs.get(artifact_type)?.state(id)
    }

    /// Initial state of `artifact_type`
    #[must_use]
    pub fn initial_state(&self, artifact_type: &ArtifactTypeId) -> Option<&State> {
        self.graphs.get(artifact_type).map(StateGraph::initial_state)
    }

    /// Every registered type, in no particular order
    pub fn artifact_types(&self) -> impl Iterator<Item = &ArtifactTypeId> {
        self.graphs.keys()
    }
}
