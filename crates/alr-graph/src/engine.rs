//! Transition engine
//!
//! Holds the legal transitions per artifact type and answers two different
//! questions:
//!
//! - **dynamic**: which states can *this* artifact move to right now
//!   ([`TransitionEngine::reachable_states`]), evaluating every guard;
//! - **static**: which states can *ever* follow a state for a type
//!   ([`TransitionEngine::all_recursive_successor_state_ids`]), ignoring
//!   guards entirely.
//!
//! Unknown types and states yield empty answers, never errors. Callers that
//! need to tell "unknown" from "unreachable" validate ids against the
//! [`StateCatalog`] first.

use crate::error::GraphError;
use crate::state::{State, StateCatalog, StateGraph};
use crate::transition::{ArtifactTypeConfig, Transition};
use alr_core::{ArtifactRecord, ArtifactTypeId, StateId};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Per-type transition tables plus the state catalog they refer to.
///
/// Built once at startup and read-only afterwards; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct TransitionEngine {
    catalog: StateCatalog,
    transitions: HashMap<ArtifactTypeId, Vec<Transition>>,
}

impl TransitionEngine {
    /// Engine over a prebuilt catalog
    #[must_use]
    pub fn new(catalog: StateCatalog) -> Self {
        Self {
            catalog,
            transitions: HashMap::new(),
        }
    }

    /// Build from `[[artifact_types]]` configuration.
    ///
    /// Unlike [`TransitionEngine::add_transition`], configured transitions
    /// must name declared states.
    ///
    /// # Errors
    /// Returns error on duplicate types/states or undeclared states
    pub fn from_config(types: &[ArtifactTypeConfig]) -> Result<Self, GraphError> {
        let mut engine = Self::default();
        for ty in types {
            if engine.catalog.graph(&ty.id).is_some() {
                return Err(GraphError::DuplicateType(ty.id.clone()));
            }
            let mut graph = StateGraph::new(ty.id.clone(), ty.initial_state.clone());
            for state in &ty.states {
                graph.add_state(state.id().clone(), state.label().map(str::to_string))?;
            }
            for t in &ty.transitions {
                for end in [&t.from, &t.to] {
                    if !graph.contains(end) {
                        return Err(GraphError::UnknownState {
                            artifact_type: ty.id.clone(),
                            state: end.clone(),
                        });
                    }
                }
            }
            engine.catalog.insert(graph);
            for t in &ty.transitions {
                engine.add_transition(
                    ty.id.clone(),
                    Transition::with_spec(t.from.clone(), t.to.clone(), t.guard.clone()),
                );
            }
            tracing::debug!(
                artifact_type = %ty.id,
                states = ty.states.len(),
                transitions = ty.transitions.len(),
                "loaded artifact type"
            );
        }
        Ok(engine)
    }

    /// Register a state graph for a type
    pub fn add_state_graph(&mut self, graph: StateGraph) {
        self.catalog.insert(graph);
    }

    /// Append a transition for `artifact_type`. Duplicates are kept.
    pub fn add_transition(&mut self, artifact_type: impl Into<ArtifactTypeId>, transition: Transition) {
        self.transitions
            .entry(artifact_type.into())
            .or_default()
            .push(transition);
    }

    /// Registered graphs
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &StateCatalog {
        &self.catalog
    }

    /// Look up one state of `artifact_type`
    #[inline]
    #[must_use]
    pub fn state(&self, artifact_type: &ArtifactTypeId, id: &StateId) -> Option<&State> {
        self.catalog.state(artifact_type, id)
    }

    /// Where new artifacts of `artifact_type` start
    #[inline]
    #[must_use]
    pub fn initial_state(&self, artifact_type: &ArtifactTypeId) -> Option<&State> {
        self.catalog.initial_state(artifact_type)
    }

    /// Outgoing transitions of `state`, in insertion order
    #[must_use]
    pub fn transitions(&self, state: &State) -> Vec<&Transition> {
        self.transitions
            .get(state.artifact_type())
            .map(|all| all.iter().filter(|t| t.from() == state.id()).collect())
            .unwrap_or_default()
    }

    /// States `artifact` may move to from `state`.
    ///
    /// Follows transition insertion order; a target reachable through two
    /// open transitions appears twice.
    #[must_use]
    pub fn reachable_states(&self, artifact: &ArtifactRecord, state: &State) -> Vec<&State> {
        let mut reachable = Vec::new();
        for transition in self.transitions(state) {
            let Some(target) = self.catalog.state(state.artifact_type(), transition.to()) else {
                tracing::warn!(
                    artifact_type = %state.artifact_type(),
                    from = %transition.from(),
                    to = %transition.to(),
                    "transition targets undeclared state"
                );
                continue;
            };
            if transition.guard().accepts(artifact, state, target) {
                reachable.push(target);
            }
        }
        reachable
    }

    /// Whether `target` is among [`TransitionEngine::reachable_states`]
    #[must_use]
    pub fn is_state_reachable(
        &self,
        artifact: &ArtifactRecord,
        target: &StateId,
        state: &State,
    ) -> bool {
        self.reachable_states(artifact, state)
            .iter()
            .any(|s| s.id() == target)
    }

    /// Every state transitively reachable from `state_id`, ignoring guards.
    ///
    /// `state_id` itself is only included when a cycle leads back to it.
    #[must_use]
    pub fn all_recursive_successor_state_ids(
        &self,
        artifact_type: &ArtifactTypeId,
        state_id: &StateId,
    ) -> BTreeSet<StateId> {
        let Some(transitions) = self.transitions.get(artifact_type) else {
            return BTreeSet::new();
        };
        let adjacency = Adjacency::build(transitions);
        let Some(start) = adjacency.index(state_id) else {
            return BTreeSet::new();
        };

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut work: VecDeque<NodeIndex> = VecDeque::new();
        for next in adjacency.graph.neighbors(start) {
            if visited.insert(next) {
                work.push_back(next);
            }
        }
        while let Some(node) = work.pop_front() {
            for next in adjacency.graph.neighbors(node) {
                if visited.insert(next) {
                    work.push_back(next);
                }
            }
        }

        visited
            .into_iter()
            .map(|idx| adjacency.graph[idx].clone())
            .collect()
    }

    /// Declared states that no path from the initial state reaches.
    #[must_use]
    pub fn unreachable_states(&self, artifact_type: &ArtifactTypeId) -> Vec<StateId> {
        let Some(graph) = self.catalog.graph(artifact_type) else {
            return Vec::new();
        };
        let initial = graph.initial_state().id();
        let mut reached = self.all_recursive_successor_state_ids(artifact_type, initial);
        reached.insert(initial.clone());
        graph
            .states()
            .filter(|s| !reached.contains(s.id()))
            .map(|s| s.id().clone())
            .collect()
    }
}

/// Adjacency over all transitions of one type
struct Adjacency {
    graph: DiGraph<StateId, ()>,
    nodes: HashMap<StateId, NodeIndex>,
}

impl Adjacency {
    fn build(transitions: &[Transition]) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for t in transitions {
            let from = *nodes
                .entry(t.from().clone())
                .or_insert_with(|| graph.add_node(t.from().clone()));
            let to = *nodes
                .entry(t.to().clone())
                .or_insert_with(|| graph.add_node(t.to().clone()));
            graph.add_edge(from, to, ());
        }
        Self { graph, nodes }
    }

    fn index(&self, id: &StateId) -> Option<NodeIndex> {
        self.nodes.get(id).copied()
    }
}
