//! Property tests for the static reachability closure.
//!
//! The closure must agree with a naive fixpoint over the edge list, must not
//! depend on guards, and must be stable across recomputation.

use alr_core::{ArtifactTypeId, StateId};
use alr_graph::{GuardSpec, StateGraph, Transition, TransitionEngine};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn name(i: usize) -> String {
    format!("s{i}")
}

fn build(n: usize, edges: &[(usize, usize, bool)]) -> TransitionEngine {
    let mut engine = TransitionEngine::default();
    engine.add_state_graph(
        StateGraph::new("T", name(0))
            .with_states((0..n).map(name))
            .unwrap(),
    );
    for &(from, to, open) in edges {
        let guard = if open { GuardSpec::Always } else { GuardSpec::Never };
        engine.add_transition("T", Transition::with_spec(name(from), name(to), guard));
    }
    engine
}

/// Reference: iterate "successors of the current set" until nothing changes.
fn naive_closure(start: usize, edges: &[(usize, usize, bool)]) -> BTreeSet<StateId> {
    let mut reached: BTreeSet<usize> = edges
        .iter()
        .filter(|(f, _, _)| *f == start)
        .map(|(_, t, _)| *t)
        .collect();
    loop {
        let next: BTreeSet<usize> = edges
            .iter()
            .filter(|(f, _, _)| reached.contains(f))
            .map(|(_, t, _)| *t)
            .collect();
        let before = reached.len();
        reached.extend(next);
        if reached.len() == before {
            break;
        }
    }
    reached.into_iter().map(|i| StateId::from(name(i))).collect()
}

fn graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize, bool)>)> {
    (1usize..8).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n, any::<bool>()), 0..20);
        (Just(n), edges)
    })
}

proptest! {
    #[test]
    fn closure_matches_naive_fixpoint((n, edges) in graph_strategy(), start in 0usize..8) {
        let start = start % n;
        let engine = build(n, &edges);
        let closure = engine.all_recursive_successor_state_ids(
            &ArtifactTypeId::from("T"),
            &StateId::from(name(start)),
        );
        prop_assert_eq!(closure, naive_closure(start, &edges));
    }

    #[test]
    fn closure_is_idempotent((n, edges) in graph_strategy()) {
        let engine = build(n, &edges);
        let ty = ArtifactTypeId::from("T");
        let start = StateId::from(name(0));
        let first = engine.all_recursive_successor_state_ids(&ty, &start);
        let second = engine.all_recursive_successor_state_ids(&ty, &start);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn closure_ignores_guard_outcomes((n, edges) in graph_strategy()) {
        let open: Vec<_> = edges.iter().map(|&(f, t, _)| (f, t, true)).collect();
        let closed: Vec<_> = edges.iter().map(|&(f, t, _)| (f, t, false)).collect();
        let ty = ArtifactTypeId::from("T");
        let start = StateId::from(name(0));
        prop_assert_eq!(
            build(n, &open).all_recursive_successor_state_ids(&ty, &start),
            build(n, &closed).all_recursive_successor_state_ids(&ty, &start)
        );
    }
}

#[test]
fn two_cycle_closure_contains_both_states() {
    let engine = build(2, &[(0, 1, true), (1, 0, true)]);
    let closure = engine
        .all_recursive_successor_state_ids(&ArtifactTypeId::from("T"), &StateId::from("s0"));
    let expected: BTreeSet<StateId> = ["s0", "s1"].into_iter().map(StateId::from).collect();
    assert_eq!(closure, expected);
}
