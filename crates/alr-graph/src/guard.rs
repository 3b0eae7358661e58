//! Transition validity guards
//!
//! A guard decides, for one live artifact, whether a transition may be taken.
//! Configured guards come from the closed set in [`GuardSpec`]; code can
//! supply any closure with the right shape.

use crate::state::State;
use alr_core::{ArtifactRecord, Document};
use serde::{Deserialize, Serialize};

/// Validity predicate over `(artifact, from, to)`
pub trait TransitionGuard: Send + Sync {
    /// Whether the transition `from -> to` is open for `artifact`
    fn accepts(&self, artifact: &ArtifactRecord, from: &State, to: &State) -> bool;
}

impl<F> TransitionGuard for F
where
    F: Fn(&ArtifactRecord, &State, &State) -> bool + Send + Sync,
{
    fn accepts(&self, artifact: &ArtifactRecord, from: &State, to: &State) -> bool {
        self(artifact, from, to)
    }
}

/// Guards expressible in configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardSpec {
    /// Always open
    #[default]
    Always,
    /// Never open (kept for type-level reachability hints only)
    Never,
    /// Open once the artifact's data has a non-null value at `field`
    RequiresField { field: String },
    /// Open while the value at `field` equals `value`
    FieldEquals { field: String, value: Document },
}

impl TransitionGuard for GuardSpec {
    fn accepts(&self, artifact: &ArtifactRecord, _from: &State, _to: &State) -> bool {
        match self {
            GuardSpec::Always => true,
            GuardSpec::Never => false,
            GuardSpec::RequiresField { field } => {
                artifact.field(field).is_some_and(|v| !v.is_null())
            }
            GuardSpec::FieldEquals { field, value } => artifact.field(field) == Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateGraph;
    use alr_core::{ArtifactId, ArtifactTypeId, StateId};
    use serde_json::json;

    fn check(guard: &dyn TransitionGuard, data: Document) -> bool {
        let graph = StateGraph::new("X", "a").with_states(["b"]).unwrap();
        let from = graph.state(&StateId::from("a")).unwrap();
        let to = graph.state(&StateId::from("b")).unwrap();
        let record = ArtifactRecord::new(
            ArtifactId::new(),
            ArtifactTypeId::from("X"),
            "x",
            StateId::from("a"),
            data,
        );
        guard.accepts(&record, from, to)
    }

    #[test]
    fn requires_field_ignores_null() {
        let guard = GuardSpec::RequiresField { field: "foo".into() };
        assert!(!check(&guard, json!({})));
        assert!(!check(&guard, json!({"foo": null})));
        assert!(check(&guard, json!({"foo": 1})));
    }

    #[test]
    fn field_equals_compares_documents() {
        let guard = GuardSpec::FieldEquals {
            field: "/mode".into(),
            value: json!("fast"),
        };
        assert!(check(&guard, json!({"mode": "fast"})));
        assert!(!check(&guard, json!({"mode": "slow"})));
    }

    #[test]
    fn closures_are_guards() {
        let guard = |a: &ArtifactRecord, _: &State, to: &State| {
            a.data().get("allow").and_then(Document::as_str) == Some(to.id().as_str())
        };
        assert!(check(&guard, json!({"allow": "b"})));
        assert!(!check(&guard, json!({"allow": "c"})));
    }

    #[test]
    fn guard_spec_parses_from_tagged_form() {
        let spec: GuardSpec =
            serde_json::from_value(json!({"kind": "requires_field", "field": "foo"})).unwrap();
        assert_eq!(spec, GuardSpec::RequiresField { field: "foo".into() });
    }
}
