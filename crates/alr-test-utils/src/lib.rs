//! Testing utilities for the ALR workspace
//!
//! The fixture artifact type "X":
//!
//! ```text
//! start --(requires foo)--> ready <--> done
//! ```
//!
//! Its behavior counts calls, and parks background tickets when fed
//! `{"background": true}` so tests decide when the worker reports. Adding
//! `"fail": true` makes the feed fail after parking.

#![allow(missing_docs)]

use alr_context::{BackgroundTicket, CallContext};
use alr_core::{ArtifactRecord, ArtifactTypeId, Document};
use alr_graph::{GuardSpec, State, StateGraph, Transition, TransitionEngine};
use alr_registry::{
    ArtifactBehavior, ArtifactCell, ArtifactFactory, BehaviorError, InMemoryStorage, Operation,
    Registry, RegistryConfig,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const X_TYPE: &str = "X";
pub const X_FACTORY: &str = "x";

/// State graph and transitions of "X"
pub fn x_engine() -> TransitionEngine {
    let mut engine = TransitionEngine::default();
    engine.add_state_graph(
        StateGraph::new(X_TYPE, "start")
            .with_states(["ready", "done"])
            .unwrap(),
    );
    engine.add_transition(
        X_TYPE,
        Transition::with_spec("start", "ready", GuardSpec::RequiresField { field: "foo".into() }),
    );
    engine.add_transition(X_TYPE, Transition::new("ready", "done"));
    engine.add_transition(X_TYPE, Transition::new("done", "ready"));
    engine
}

/// Call counters of [`XBehavior`]
#[derive(Debug, Default)]
pub struct Calls {
    pub describe: AtomicUsize,
    pub feed: AtomicUsize,
    pub advance: AtomicUsize,
    pub out: AtomicUsize,
    pub end_of_life: AtomicUsize,
    pub cleanup: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct XBehavior {
    pub calls: Calls,
    advance_delay: Option<Duration>,
    parked: Mutex<Vec<(ArtifactCell, BackgroundTicket)>>,
}

impl XBehavior {
    #[must_use]
    pub fn with_advance_delay(delay: Duration) -> Self {
        Self {
            advance_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Tickets parked by background feeds, oldest first
    pub fn take_parked(&self) -> Vec<(ArtifactCell, BackgroundTicket)> {
        std::mem::take(&mut *self.parked.lock())
    }
}

#[async_trait]
impl ArtifactBehavior for XBehavior {
    async fn describe(&self, op: Operation<'_>, _input: &Document) -> Result<Document, BehaviorError> {
        self.calls.describe.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({
            "state": op.record.state(),
            "data": op.record.data(),
        }))
    }

    async fn feed(&self, op: Operation<'_>, input: Document) -> Result<(), BehaviorError> {
        self.calls.feed.fetch_add(1, Ordering::SeqCst);
        if input.get("background").and_then(Document::as_bool) == Some(true) {
            self.parked.lock().push(op.background());
            if input.get("fail").and_then(Document::as_bool) == Some(true) {
                return Err(BehaviorError::failed("failed after handing off"));
            }
            return Ok(());
        }
        let Document::Object(fields) = input else {
            return Err(BehaviorError::InvalidInput("expected an object".into()));
        };
        op.record.update_data(|data| {
            if let Document::Object(map) = data {
                map.extend(fields);
            }
        });
        Ok(())
    }

    async fn advance(&self, op: Operation<'_>, from: &State, to: &State) -> Result<(), BehaviorError> {
        self.calls.advance.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.advance_delay {
            tokio::time::sleep(delay).await;
        }
        let step = format!("{}->{}", from.id(), to.id());
        op.record.update_data(|data| {
            if let Document::Object(map) = data {
                let history = map
                    .entry("history")
                    .or_insert_with(|| Document::Array(Vec::new()));
                if let Document::Array(steps) = history {
                    steps.push(Document::String(step));
                }
            }
        });
        Ok(())
    }

    async fn produce_output(
        &self,
        op: Operation<'_>,
        output_type: &str,
        format: &str,
    ) -> Result<Vec<u8>, BehaviorError> {
        self.calls.out.fetch_add(1, Ordering::SeqCst);
        match (output_type, format) {
            ("summary", "json") => Ok(serde_json::to_vec(op.record.data())?),
            _ => Err(BehaviorError::unsupported_output(output_type, format)),
        }
    }

    async fn end_of_life(&self, _record: &ArtifactRecord) {
        self.calls.end_of_life.fetch_add(1, Ordering::SeqCst);
    }

    async fn cleanup(&self, _record: &ArtifactRecord) {
        self.calls.cleanup.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory for "X"
pub struct XFactory {
    artifact_type: ArtifactTypeId,
    ttl: Option<Duration>,
    behavior: Arc<XBehavior>,
}

impl XFactory {
    pub fn new(behavior: Arc<XBehavior>, ttl: Option<Duration>) -> Self {
        Self {
            artifact_type: ArtifactTypeId::from(X_TYPE),
            ttl,
            behavior,
        }
    }
}

#[async_trait]
impl ArtifactFactory for XFactory {
    fn name(&self) -> &str {
        X_FACTORY
    }

    fn artifact_type(&self) -> &ArtifactTypeId {
        &self.artifact_type
    }

    async fn create(&self, _context: &CallContext, input: &Document) -> Result<Document, BehaviorError> {
        match input {
            Document::Null => Ok(serde_json::json!({})),
            Document::Object(_) => Ok(input.clone()),
            _ => Err(BehaviorError::InvalidInput("expected an object".into())),
        }
    }

    fn time_to_live_untouched(&self, _record: &ArtifactRecord) -> Option<Duration> {
        self.ttl
    }

    fn behavior(&self) -> Arc<dyn ArtifactBehavior> {
        self.behavior.clone()
    }
}

/// A registry over in-memory storage with the "X" factory registered
pub struct Fixture {
    pub registry: Arc<Registry>,
    pub storage: Arc<InMemoryStorage>,
    pub behavior: Arc<XBehavior>,
}

pub fn fixture(ttl: Option<Duration>) -> Fixture {
    fixture_with(XBehavior::default(), ttl, RegistryConfig::default())
}

pub fn fixture_with(behavior: XBehavior, ttl: Option<Duration>, config: RegistryConfig) -> Fixture {
    let storage = Arc::new(InMemoryStorage::new());
    let behavior = Arc::new(behavior);
    let registry = Registry::new(Arc::new(x_engine()), storage.clone(), config);
    registry.register_factory(Arc::new(XFactory::new(behavior.clone(), ttl)));
    Fixture {
        registry: Arc::new(registry),
        storage,
        behavior,
    }
}
