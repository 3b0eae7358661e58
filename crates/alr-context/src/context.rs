//! Per-call context
//!
//! A [`CallContext`] is created fresh for every operation. It carries the
//! post-action decision, the artifact's message log, a typed scratch map and
//! the data-provider registry. It is `Send + Sync` and can be shared with a
//! background continuation through an `Arc`.

use crate::background::{self, BackgroundCompletion, BackgroundTicket};
use crate::decision::{PostAction, TerminalAction};
use crate::messages::MessageLog;
use crate::provider::{DataProvider, ProviderError};
use alr_core::{CallMeta, Document};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type ScratchValue = Arc<dyn Any + Send + Sync>;

struct Decision {
    action: PostAction,
    pending: Option<BackgroundCompletion>,
}

/// Context for one operation on one artifact
pub struct CallContext {
    meta: CallMeta,
    messages: MessageLog,
    decision: Mutex<Decision>,
    scratch: Mutex<HashMap<String, ScratchValue>>,
    providers: Mutex<HashMap<String, Vec<Arc<dyn DataProvider>>>>,
    depth: AtomicUsize,
    max_provider_depth: Option<usize>,
}

impl CallContext {
    /// Fresh context whose decision starts at `touch`
    #[must_use]
    pub fn new(meta: CallMeta, messages: MessageLog) -> Self {
        Self {
            meta,
            messages,
            decision: Mutex::new(Decision {
                action: PostAction::Touch,
                pending: None,
            }),
            scratch: Mutex::new(HashMap::new()),
            providers: Mutex::new(HashMap::new()),
            depth: AtomicUsize::new(0),
            max_provider_depth: None,
        }
    }

    /// Start from `action` instead of `touch`
    #[must_use]
    pub fn with_default_action(self, action: TerminalAction) -> Self {
        self.decision.lock().action = action.into();
        self
    }

    /// Bound nested `provide_data` calls
    #[must_use]
    pub fn with_max_provider_depth(mut self, limit: Option<usize>) -> Self {
        self.max_provider_depth = limit;
        self
    }

    /// Caller identity and request id
    #[inline]
    #[must_use]
    pub fn meta(&self) -> &CallMeta {
        &self.meta
    }

    /// The artifact's message log
    #[inline]
    #[must_use]
    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    // === Post-action decision ===

    /// Decision currently in effect
    #[must_use]
    pub fn post_action(&self) -> PostAction {
        self.decision.lock().action
    }

    /// Set a terminal decision. Overrides an earlier background request; the
    /// ticket handed out for it then reports into the void.
    pub fn set_post_action(&self, action: TerminalAction) {
        let mut decision = self.decision.lock();
        decision.action = action.into();
        decision.pending = None;
    }

    /// Request background execution and get the ticket the worker must report on.
    ///
    /// Calling this again replaces the earlier ticket.
    pub fn go_background(&self) -> BackgroundTicket {
        let (ticket, completion) = background::channel(self.messages.clone());
        let mut decision = self.decision.lock();
        decision.action = PostAction::Background;
        decision.pending = Some(completion);
        ticket
    }

    /// Whether the operation handed its work to the background
    #[must_use]
    pub fn is_in_background(&self) -> bool {
        self.decision.lock().action == PostAction::Background
    }

    /// Final decision and, for `background`, the completion to wait on.
    ///
    /// Called once by the lifecycle controller after the operation returns.
    pub fn take_decision(&self) -> (PostAction, Option<BackgroundCompletion>) {
        let mut decision = self.decision.lock();
        (decision.action, decision.pending.take())
    }

    // === Scratch map ===

    /// Store a value, replacing whatever was under `key`
    pub fn put<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.scratch.lock().insert(key.into(), Arc::new(value));
    }

    /// Value under `key` if it has type `T`
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.scratch.lock().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Remove and return the value under `key` if it has type `T`.
    ///
    /// A value of another type stays in place.
    pub fn take<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let mut scratch = self.scratch.lock();
        if !scratch.get(key)?.is::<T>() {
            return None;
        }
        scratch.remove(key)?.downcast::<T>().ok()
    }

    /// Drop the value under `key`, whatever its type
    pub fn remove(&self, key: &str) -> bool {
        self.scratch.lock().remove(key).is_some()
    }

    /// Whether `key` is already on the provider stack
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.scratch.lock().contains_key(key)
    }

    // === Data providers ===

    /// Register `provider` under `key`, returning the one registered before it
    pub fn register_data_provider(
        &self,
        key: impl Into<String>,
        provider: Arc<dyn DataProvider>,
    ) -> Option<Arc<dyn DataProvider>> {
        let mut providers = self.providers.lock();
        let list = providers.entry(key.into()).or_default();
        let previous = list.last().cloned();
        list.push(provider);
        previous
    }

    /// Every provider registered under `key`, oldest first
    #[must_use]
    pub fn data_providers(&self, key: &str) -> Vec<Arc<dyn DataProvider>> {
        self.providers.lock().get(key).cloned().unwrap_or_default()
    }

    /// Most recently registered provider under `key`
    #[must_use]
    pub fn data_provider(&self, key: &str) -> Option<Arc<dyn DataProvider>> {
        self.providers.lock().get(key)?.last().cloned()
    }

    /// Ask the current provider under `key` for data.
    ///
    /// Returns `Ok(None)` when no provider is registered.
    ///
    /// # Errors
    /// Propagates the provider's failure, or [`ProviderError::DepthExceeded`]
    /// when nesting passes the configured bound.
    pub fn provide_data(&self, key: &str, param: &Document) -> Result<Option<Document>, ProviderError> {
        // Resolve outside the lock; the provider may call back in.
        let Some(provider) = self.data_provider(key) else {
            return Ok(None);
        };

        let guard = DepthGuard::enter(&self.depth);
        if let Some(limit) = self.max_provider_depth {
            if guard.depth > limit {
                tracing::warn!(key, limit, "data provider nesting limit exceeded");
                return Err(ProviderError::DepthExceeded {
                    key: key.to_string(),
                    limit,
                });
            }
        }
        let provided = provider.provide_data(key, param, self).map(Some);
        drop(guard);
        provided
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("meta", &self.meta)
            .field("post_action", &self.post_action())
            .field("messages", &self.messages.len())
            .finish_non_exhaustive()
    }
}

struct DepthGuard<'a> {
    counter: &'a AtomicUsize,
    depth: usize,
}

impl<'a> DepthGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let depth = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self { counter, depth }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> CallContext {
        CallContext::new(CallMeta::new(), MessageLog::new())
    }

    fn constant(value: Document) -> Arc<dyn DataProvider> {
        Arc::new(
            move |_: &str, _: &Document, _: &CallContext| -> Result<Document, ProviderError> {
                Ok(value.clone())
            },
        )
    }

    #[test]
    fn default_decision_is_touch_unless_configured() {
        assert_eq!(context().post_action(), PostAction::Touch);
        let cx = context().with_default_action(TerminalAction::None);
        assert_eq!(cx.post_action(), PostAction::None);
    }

    #[test]
    fn last_decision_wins() {
        let cx = context();
        cx.set_post_action(TerminalAction::Persist);
        let _ticket = cx.go_background();
        assert!(cx.is_in_background());
        cx.set_post_action(TerminalAction::None);

        let (action, completion) = cx.take_decision();
        assert_eq!(action, PostAction::None);
        assert!(completion.is_none());
        assert!(!cx.is_in_background());
    }

    #[test]
    fn background_decision_carries_completion() {
        let cx = context();
        let _ticket = cx.go_background();
        let (action, completion) = cx.take_decision();
        assert_eq!(action, PostAction::Background);
        assert!(completion.is_some());
    }

    #[test]
    fn ticket_shares_the_artifact_log() {
        let log = MessageLog::new();
        let cx = CallContext::new(CallMeta::new(), log.clone());
        let ticket = cx.go_background();
        ticket.messages().info("halfway");
        assert_eq!(log.peek().len(), 1);
    }

    #[test]
    fn scratch_map_is_typed() {
        let cx = context();
        cx.put("n", 7_u32);
        assert_eq!(cx.get::<u32>("n").as_deref(), Some(&7));
        assert!(cx.get::<String>("n").is_none());
        assert!(cx.take::<String>("n").is_none());
        assert!(cx.contains("n"));
        assert_eq!(cx.take::<u32>("n").as_deref(), Some(&7));
        assert!(!cx.contains("n"));

        cx.put("s", "a".to_string());
        cx.put("s", "b".to_string());
        assert_eq!(cx.get::<String>("s").as_deref().map(String::as_str), Some("b"));
        assert!(cx.remove("s"));
        assert!(!cx.remove("s"));
    }

    #[test]
    fn registration_appends_and_reads_last() {
        let cx = context();
        assert!(cx.register_data_provider("k", constant(json!(1))).is_none());
        let previous = cx.register_data_provider("k", constant(json!(2)));
        assert!(previous.is_some());

        assert_eq!(cx.data_providers("k").len(), 2);
        assert_eq!(cx.provide_data("k", &json!(null)).unwrap(), Some(json!(2)));
    }

    #[test]
    fn missing_provider_yields_nothing() {
        let cx = context();
        assert!(cx.data_providers("nope").is_empty());
        assert!(cx.data_provider("nope").is_none());
        assert_eq!(cx.provide_data("nope", &json!({})).unwrap(), None);
    }

    #[test]
    fn providers_may_call_back_into_the_blackboard() {
        let cx = context();
        cx.register_data_provider("base", constant(json!(20)));
        cx.register_data_provider(
            "derived",
            Arc::new(|_: &str, param: &Document, cx: &CallContext| -> Result<Document, ProviderError> {
                let base = cx.provide_data("base", &Document::Null)?.and_then(|v| v.as_i64());
                Ok(json!(base.unwrap_or(0) + param.as_i64().unwrap_or(0)))
            }),
        );
        assert_eq!(cx.provide_data("derived", &json!(22)).unwrap(), Some(json!(42)));
    }

    #[test]
    fn provider_failures_propagate() {
        let cx = context();
        cx.register_data_provider(
            "broken",
            Arc::new(|key: &str, _: &Document, _: &CallContext| -> Result<Document, ProviderError> {
                Err(ProviderError::failed(key, "backend down"))
            }),
        );
        assert!(matches!(
            cx.provide_data("broken", &json!(null)),
            Err(ProviderError::Failed { .. })
        ));
    }

    #[test]
    fn depth_bound_stops_self_recursion() {
        let cx = context().with_max_provider_depth(Some(3));
        cx.register_data_provider(
            "loop",
            Arc::new(|key: &str, param: &Document, cx: &CallContext| -> Result<Document, ProviderError> {
                cx.provide_data(key, param).map(|v| v.unwrap_or(Document::Null))
            }),
        );
        assert_eq!(
            cx.provide_data("loop", &json!(null)),
            Err(ProviderError::DepthExceeded {
                key: "loop".into(),
                limit: 3
            })
        );
        // The counter unwinds fully.
        cx.register_data_provider("loop", constant(json!("ok")));
        assert_eq!(cx.provide_data("loop", &json!(null)).unwrap(), Some(json!("ok")));
    }
}
