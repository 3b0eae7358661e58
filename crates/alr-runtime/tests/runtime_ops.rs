//! Façade behavior over the "X" fixture

use alr_context::{CallContext, DataProvider, ProviderError, TerminalAction};
use alr_core::{ArtifactId, ArtifactTypeId, CallMeta, Document, StateId, UserId};
use alr_registry::{
    ArtifactBehavior, ArtifactFactory, BehaviorError, InMemoryStorage, Operation, StorageKey,
};
use alr_runtime::{ErrorKind, Runtime, RuntimeConfig, User};
use alr_test_utils::{x_engine, Calls, XBehavior, XFactory};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn runtime_with(behavior: Arc<XBehavior>, config: RuntimeConfig) -> Runtime {
    Runtime::builder(config)
        .engine(x_engine())
        .factory(Arc::new(XFactory::new(behavior, None)))
        .build()
        .unwrap()
}

fn runtime() -> (Runtime, Arc<XBehavior>) {
    let behavior = Arc::new(XBehavior::default());
    (runtime_with(behavior.clone(), RuntimeConfig::default()), behavior)
}

fn meta() -> CallMeta {
    CallMeta::new().with_user("alice").with_request_id("test")
}

fn state(id: &str) -> StateId {
    StateId::from(id)
}

#[tokio::test]
async fn end_to_end() {
    let (runtime, behavior) = runtime();

    let (id, created) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    assert_eq!(created.state, state("start"));
    assert!(created.reachable_states.is_empty());
    assert_eq!(created.body, Some(json!({"state": "start", "data": {}})));

    let error = runtime.advance(id, &state("ready"), &meta()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::IllegalTransition);

    let fed = runtime.feed(id, json!({"foo": 1}), &meta()).await.unwrap();
    assert_eq!(fed.reachable_states, vec![state("ready")]);

    let advanced = runtime.advance(id, &state("ready"), &meta()).await.unwrap();
    assert_eq!(advanced.state, state("ready"));
    assert_eq!(advanced.reachable_states, vec![state("done")]);

    let first = runtime.out(id, "summary", "json", &meta()).await.unwrap();
    let second = runtime.out(id, "summary", "json", &meta()).await.unwrap();
    assert!(!first.from_cache());
    assert!(second.from_cache());
    assert_eq!(first.bytes(), second.bytes());
    assert_eq!(Calls::get(&behavior.calls.out), 1);

    runtime.feed(id, json!({"bar": 2}), &meta()).await.unwrap();
    let third = runtime.out(id, "summary", "json", &meta()).await.unwrap();
    assert!(!third.from_cache());
    assert_eq!(Calls::get(&behavior.calls.out), 2);

    let parsed: Document = serde_json::from_slice(third.bytes()).unwrap();
    assert_eq!(parsed["history"], json!(["start->ready"]));
}

#[tokio::test]
async fn unknown_target_state_is_illegal() {
    let (runtime, _) = runtime();
    let (id, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    runtime.feed(id, json!({"foo": 1}), &meta()).await.unwrap();

    let error = runtime.advance(id, &state("nowhere"), &meta()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::IllegalTransition);
}

#[tokio::test]
async fn error_kinds_for_missing_things() {
    let (runtime, _) = runtime();

    let error = runtime.create("nope", &meta(), &Document::Null).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::FactoryNotFound);

    let error = runtime
        .describe(ArtifactId::new(), &Document::Null, &meta())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::UnknownArtifact);

    let (id, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    let error = runtime.out(id, "pdf", "a4", &meta()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::UnsupportedOutput);

    let error = runtime.feed(id, json!([1, 2]), &meta()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Behavior);
}

#[tokio::test]
async fn background_handshake() {
    let (runtime, behavior) = runtime();
    let (id, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    runtime.feed(id, json!({"foo": 1}), &meta()).await.unwrap();

    let pending = runtime.feed(id, json!({"background": true}), &meta()).await.unwrap();
    assert!(pending.in_background);
    assert!(pending.reachable_states.is_empty());

    for result in [
        runtime.advance(id, &state("ready"), &meta()).await.map(|_| ()),
        runtime.feed(id, json!({"x": 1}), &meta()).await.map(|_| ()),
        runtime.out(id, "summary", "json", &meta()).await.map(|_| ()),
        runtime.delete_artifact(id).await,
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Busy);
    }

    let describes = Calls::get(&behavior.calls.describe);
    let snapshot = runtime.describe(id, &Document::Null, &meta()).await.unwrap();
    assert!(snapshot.in_background);
    assert_eq!(snapshot.state, state("start"));
    assert_eq!(snapshot.body, None);
    assert_eq!(Calls::get(&behavior.calls.describe), describes);

    let (cell, ticket) = behavior.take_parked().pop().unwrap();
    cell.lock().await.update_data(|data| data["answer"] = json!(42));
    ticket.messages().info("done thinking");
    assert!(ticket.complete(TerminalAction::Touch));

    let described = loop {
        let described = runtime.describe(id, &Document::Null, &meta()).await.unwrap();
        if !described.in_background {
            break described;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    };
    assert_eq!(described.body.unwrap()["data"]["answer"], json!(42));
    assert_eq!(described.messages.len(), 1);

    let drained = runtime.drain_messages(id).await.unwrap();
    assert_eq!(drained[0].text, "done thinking");
    assert!(runtime.drain_messages(id).await.unwrap().is_empty());

    runtime.advance(id, &state("ready"), &meta()).await.unwrap();
}

#[tokio::test]
async fn dropped_ticket_unpins_with_message() {
    let (runtime, behavior) = runtime();
    let (id, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    runtime.feed(id, json!({"background": true}), &meta()).await.unwrap();

    drop(behavior.take_parked());

    let messages = loop {
        let described = runtime.describe(id, &Document::Null, &meta()).await.unwrap();
        if !described.in_background {
            break described.messages;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    };
    assert_eq!(messages.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_advances_commit_once() {
    let behavior = Arc::new(XBehavior::with_advance_delay(Duration::from_millis(20)));
    let runtime = Arc::new(runtime_with(behavior.clone(), RuntimeConfig::default()));
    let (id, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    runtime.feed(id, json!({"foo": 1}), &meta()).await.unwrap();

    let attempts = (0..8).map(|_| {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.advance(id, &StateId::from("ready"), &meta()).await })
    });
    let results = futures::future::join_all(attempts).await;

    let mut succeeded = 0;
    for result in results {
        match result.unwrap() {
            Ok(description) => {
                succeeded += 1;
                assert_eq!(description.state, state("ready"));
            }
            Err(error) => assert_eq!(error.kind(), ErrorKind::IllegalTransition),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(Calls::get(&behavior.calls.advance), 1);

    let out = runtime.out(id, "summary", "json", &meta()).await.unwrap();
    let data: Document = serde_json::from_slice(out.bytes()).unwrap();
    assert_eq!(data["history"], json!(["start->ready"]));
}

#[tokio::test]
async fn reachability_queries() {
    let (runtime, _) = runtime();
    let (id, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    assert!(runtime.reachable_states(id).await.unwrap().is_empty());
    runtime.feed(id, json!({"foo": true}), &meta()).await.unwrap();
    assert_eq!(runtime.reachable_states(id).await.unwrap(), vec![state("ready")]);

    let x = ArtifactTypeId::from("X");
    let from_start: Vec<_> = runtime.successor_states(&x, &state("start")).into_iter().collect();
    assert_eq!(from_start, vec![state("done"), state("ready")]);
    let from_ready: Vec<_> = runtime.successor_states(&x, &state("ready")).into_iter().collect();
    assert_eq!(from_ready, vec![state("done"), state("ready")]);
    assert!(runtime
        .successor_states(&ArtifactTypeId::from("Y"), &state("start"))
        .is_empty());
}

#[tokio::test]
async fn delete_then_unknown() {
    let (runtime, behavior) = runtime();
    let (id, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    runtime.delete_artifact(id).await.unwrap();

    assert_eq!(Calls::get(&behavior.calls.end_of_life), 1);
    let error = runtime.describe(id, &Document::Null, &meta()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::UnknownArtifact);
}

#[tokio::test]
async fn persist_by_default_survives_restart() {
    let storage = Arc::new(InMemoryStorage::new());
    let config = RuntimeConfig::default().with_default_post_action(TerminalAction::Persist);
    let first = Runtime::builder(config.clone())
        .engine(x_engine())
        .storage(storage.clone())
        .factory(Arc::new(XFactory::new(Arc::new(XBehavior::default()), None)))
        .build()
        .unwrap();
    let (id, _) = first.create("x", &meta(), &Document::Null).await.unwrap();
    first.feed(id, json!({"foo": 1}), &meta()).await.unwrap();
    assert!(storage.contains(StorageKey::Artifact(id)));

    let second = Runtime::builder(config)
        .engine(x_engine())
        .storage(storage.clone())
        .factory(Arc::new(XFactory::new(Arc::new(XBehavior::default()), None)))
        .build()
        .unwrap();
    let report = second.load_all_artifacts().await.unwrap();
    assert_eq!(report.artifacts, 1);

    let restored = second.advance(id, &state("ready"), &meta()).await.unwrap();
    assert_eq!(restored.state, state("ready"));
}

#[tokio::test]
async fn collections_and_users() {
    let (runtime, _) = runtime();
    let alice = UserId::from("alice");

    let error = runtime
        .create_collection(&alice, "inbox", serde_json::Map::new())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::UnknownUser);

    assert!(runtime.create_user(User::new("alice", ["editor"])).await);
    assert!(!runtime.create_user(User::new("alice", ["editor", "admin"])).await);
    assert!(runtime.get_user(&alice).await.unwrap().has_role("admin"));
    assert_eq!(runtime.list_users().await.len(), 1);

    let collection = runtime
        .create_collection(&alice, "inbox", serde_json::Map::new())
        .await
        .unwrap();
    let (a, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    let (b, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    runtime.add_item(collection.id(), b, json!({"rank": 1})).await.unwrap();
    runtime.add_item(collection.id(), a, json!({"rank": 2})).await.unwrap();

    let updated = runtime
        .set_collection_attribute(collection.id(), "color", json!("blue"))
        .await
        .unwrap();
    assert_eq!(updated.attributes()["color"], json!("blue"));

    let items = runtime.list_items(collection.id()).await.unwrap();
    assert_eq!(items.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![b, a]);

    let listing = runtime.collection_out(collection.id(), "items", "json").await.unwrap();
    let parsed: Document = serde_json::from_slice(listing.bytes()).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2);

    assert_eq!(runtime.remove_item(collection.id(), b).await.unwrap(), json!({"rank": 1}));
    assert_eq!(
        runtime.remove_item(collection.id(), b).await.unwrap_err().kind(),
        ErrorKind::UnknownArtifact
    );
    assert_eq!(runtime.list_collections(&alice).len(), 1);

    runtime.delete_collection(collection.id()).await.unwrap();
    assert_eq!(
        runtime.describe_collection(collection.id()).await.unwrap_err().kind(),
        ErrorKind::UnknownCollection
    );
    runtime.describe(a, &Document::Null, &meta()).await.unwrap();

    runtime.delete_user(&alice).await.unwrap();
    assert_eq!(runtime.get_user(&alice).await.unwrap_err().kind(), ErrorKind::UnknownUser);
}

/// Behavior whose feed reads "price" through the blackboard
struct Priced;

#[async_trait::async_trait]
impl ArtifactBehavior for Priced {
    async fn feed(&self, op: Operation<'_>, input: Document) -> Result<(), BehaviorError> {
        let failing = input.get("fail").and_then(Document::as_bool) == Some(true);
        let provider: Arc<dyn DataProvider> = Arc::new(
            move |key: &str, param: &Document, cx: &CallContext| -> Result<Document, ProviderError> {
                if failing {
                    return Err(ProviderError::failed(key, "quote service down"));
                }
                if param.as_str() == Some("recurse") {
                    return cx.provide_data(key, param).map(|v| v.unwrap_or(Document::Null));
                }
                Ok(json!(9.5))
            },
        );
        op.context.register_data_provider("price", provider);
        let param = input.get("param").cloned().unwrap_or(Document::Null);
        let price = op.context.provide_data("price", &param)?;
        op.record.update_data(|data| data["price"] = price.unwrap_or(Document::Null));
        Ok(())
    }
}

struct PricedFactory(ArtifactTypeId);

#[async_trait::async_trait]
impl ArtifactFactory for PricedFactory {
    fn name(&self) -> &str {
        "priced"
    }

    fn artifact_type(&self) -> &ArtifactTypeId {
        &self.0
    }

    async fn create(&self, _context: &CallContext, _input: &Document) -> Result<Document, BehaviorError> {
        Ok(json!({}))
    }

    fn behavior(&self) -> Arc<dyn ArtifactBehavior> {
        Arc::new(Priced)
    }
}

#[tokio::test]
async fn provider_results_and_failures() {
    let runtime = Runtime::builder(RuntimeConfig::default().with_max_provider_depth(4))
        .engine(x_engine())
        .factory(Arc::new(PricedFactory(ArtifactTypeId::from("X"))))
        .build()
        .unwrap();
    let (id, _) = runtime.create("priced", &meta(), &Document::Null).await.unwrap();

    runtime.feed(id, json!({}), &meta()).await.unwrap();
    let out = runtime.describe(id, &Document::Null, &meta()).await.unwrap();
    assert_eq!(out.body.unwrap()["price"], json!(9.5));

    let error = runtime.feed(id, json!({"fail": true}), &meta()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Provider);

    let error = runtime
        .feed(id, json!({"param": "recurse"}), &meta())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Provider);
}

#[tokio::test]
async fn deleted_artifacts_stay_deleted_under_queued_calls() {
    let storage = Arc::new(InMemoryStorage::new());
    let behavior = Arc::new(XBehavior::with_advance_delay(Duration::from_millis(30)));
    let runtime = Arc::new(
        Runtime::builder(RuntimeConfig::default().with_default_post_action(TerminalAction::Persist))
            .engine(x_engine())
            .storage(storage.clone())
            .factory(Arc::new(XFactory::new(behavior, None)))
            .build()
            .unwrap(),
    );
    let (id, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();
    runtime.feed(id, json!({"foo": 1}), &meta()).await.unwrap();

    let advance = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.advance(id, &StateId::from("ready"), &meta()).await })
    };
    tokio::task::yield_now().await;
    let delete = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.delete_artifact(id).await })
    };
    tokio::task::yield_now().await;
    let feed = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.feed(id, json!({"late": true}), &meta()).await })
    };

    advance.await.unwrap().unwrap();
    delete.await.unwrap().unwrap();
    assert_eq!(feed.await.unwrap().unwrap_err().kind(), ErrorKind::UnknownArtifact);

    assert!(!storage.contains(StorageKey::Artifact(id)));
    let error = runtime.describe(id, &Document::Null, &meta()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::UnknownArtifact);
}

#[tokio::test]
async fn failing_after_background_still_pins() {
    let (runtime, behavior) = runtime();
    let (id, _) = runtime.create("x", &meta(), &Document::Null).await.unwrap();

    let error = runtime
        .feed(id, json!({"background": true, "fail": true}), &meta())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Behavior);

    let pinned = runtime.describe(id, &Document::Null, &meta()).await.unwrap();
    assert!(pinned.in_background);
    let busy = runtime.feed(id, json!({"foo": 1}), &meta()).await.unwrap_err();
    assert_eq!(busy.kind(), ErrorKind::Busy);

    let (cell, ticket) = behavior.take_parked().pop().unwrap();
    cell.lock().await.update_data(|data| data["partial"] = json!(true));
    ticket.messages().error("gave up halfway");
    assert!(ticket.complete(TerminalAction::Touch));

    let described = loop {
        let described = runtime.describe(id, &Document::Null, &meta()).await.unwrap();
        if !described.in_background {
            break described;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    };
    assert_eq!(described.body.unwrap()["data"]["partial"], json!(true));
    assert_eq!(described.messages[0].text, "gave up halfway");
    runtime.feed(id, json!({"foo": 1}), &meta()).await.unwrap();
}
