//! Lifecycle controller
//!
//! Applies the post-action decision an operation leaves on its call context,
//! and owns the background handshake: a `background` decision pins the
//! artifact until the worker reports, drops its ticket, or the watchdog fires.

use crate::error::RegistryError;
use crate::slot::ArtifactSlot;
use crate::storage::{PersistedArtifact, StorageKey, StoragePort};
use alr_context::{BackgroundCompletion, BackgroundOutcome, CallContext, PostAction, TerminalAction};
use alr_core::ArtifactRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Applies post-action decisions
#[derive(Clone)]
pub struct LifecycleController {
    storage: Arc<dyn StoragePort>,
    background_timeout: Option<Duration>,
}

impl LifecycleController {
    /// Controller over `storage`; `None` disables the background watchdog
    pub fn new(storage: Arc<dyn StoragePort>, background_timeout: Option<Duration>) -> Self {
        Self {
            storage,
            background_timeout,
        }
    }

    /// Apply the decision left on `context` after an operation on `slot`.
    ///
    /// For `background` this spawns the waiter and returns at once; the
    /// artifact reports busy until the waiter finishes.
    ///
    /// # Errors
    /// Storage or encoding failures while persisting.
    pub async fn finish(
        &self,
        slot: &Arc<ArtifactSlot>,
        record: &ArtifactRecord,
        context: &CallContext,
    ) -> Result<PostAction, RegistryError> {
        slot.refresh_snapshot(record);
        let (action, completion) = context.take_decision();
        match action.terminal() {
            Some(terminal) => self.apply(slot, record, terminal).await?,
            None => {
                self.enter_background(Arc::clone(slot), completion);
            }
        }
        Ok(action)
    }

    /// Apply one terminal decision
    ///
    /// # Errors
    /// Storage or encoding failures while persisting.
    pub async fn apply(
        &self,
        slot: &ArtifactSlot,
        record: &ArtifactRecord,
        action: TerminalAction,
    ) -> Result<(), RegistryError> {
        match action {
            TerminalAction::None => {}
            TerminalAction::Touch => slot.touch(),
            TerminalAction::Persist => {
                let persisted = PersistedArtifact {
                    owner: slot.owner().cloned(),
                    record: record.clone(),
                };
                self.storage
                    .save(StorageKey::Artifact(slot.id()), persisted.encode()?)
                    .await?;
                slot.touch();
                tracing::debug!(artifact = %slot.id(), "persisted");
            }
        }
        Ok(())
    }

    /// Pin `slot` and wait for the background worker off the caller's path
    pub fn enter_background(
        &self,
        slot: Arc<ArtifactSlot>,
        completion: Option<BackgroundCompletion>,
    ) -> JoinHandle<()> {
        slot.set_in_background(true);
        tracing::info!(artifact = %slot.id(), "entered background");

        let controller = self.clone();
        tokio::spawn(async move {
            let outcome = match completion {
                Some(completion) => completion.wait(controller.background_timeout).await,
                None => BackgroundOutcome::Dropped,
            };
            let action = match outcome {
                BackgroundOutcome::Reported(action) => action,
                BackgroundOutcome::Dropped => {
                    tracing::warn!(artifact = %slot.id(), "background ticket dropped without a report");
                    slot.messages()
                        .error("background work ended without reporting a result");
                    TerminalAction::Touch
                }
                BackgroundOutcome::TimedOut => {
                    tracing::warn!(artifact = %slot.id(), "background watchdog fired");
                    slot.messages().error("background work timed out");
                    TerminalAction::Touch
                }
            };

            let record = slot.cell().lock().await;
            if slot.is_retired() {
                tracing::debug!(artifact = %slot.id(), %action, "artifact gone, background decision dropped");
                drop(record);
                slot.set_in_background(false);
                return;
            }
            slot.refresh_snapshot(&record);
            if let Err(error) = controller.apply(&slot, &record, action).await {
                tracing::error!(artifact = %slot.id(), %error, "applying background decision failed");
                slot.messages()
                    .error(format!("applying {action} after background work failed: {error}"));
                slot.touch();
            }
            drop(record);

            slot.set_in_background(false);
            tracing::info!(artifact = %slot.id(), %action, "left background");
        })
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("background_timeout", &self.background_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::ArtifactBehavior;
    use crate::storage::{MockStoragePort, StorageError};
    use alr_context::MessageLog;
    use alr_core::{ArtifactId, ArtifactTypeId, CallMeta, StateId};
    use serde_json::json;

    struct Inert;
    impl ArtifactBehavior for Inert {}

    fn slot() -> (Arc<ArtifactSlot>, ArtifactRecord) {
        let record = ArtifactRecord::new(
            ArtifactId::new(),
            ArtifactTypeId::from("X"),
            "x",
            StateId::from("start"),
            json!({"n": 1}),
        );
        let slot = ArtifactSlot::new(record.clone(), None, Arc::new(Inert), None, MessageLog::new());
        (Arc::new(slot), record)
    }

    fn context(slot: &ArtifactSlot) -> CallContext {
        CallContext::new(CallMeta::new(), slot.messages().clone())
    }

    #[tokio::test]
    async fn persist_saves_exactly_once() {
        let (slot, record) = slot();
        let id = slot.id();
        let mut storage = MockStoragePort::new();
        storage
            .expect_save()
            .withf(move |key, bytes| *key == StorageKey::Artifact(id) && !bytes.is_empty())
            .times(1)
            .returning(|_, _| Ok(()));
        let controller = LifecycleController::new(Arc::new(storage), None);

        let cx = context(&slot);
        cx.set_post_action(TerminalAction::Persist);
        let action = controller.finish(&slot, &record, &cx).await.unwrap();
        assert_eq!(action, PostAction::Persist);
    }

    #[tokio::test]
    async fn touch_and_none_never_reach_storage() {
        let (slot, record) = slot();
        let storage = MockStoragePort::new();
        let controller = LifecycleController::new(Arc::new(storage), None);

        for action in [TerminalAction::Touch, TerminalAction::None] {
            controller.apply(&slot, &record, action).await.unwrap();
        }
    }

    #[tokio::test]
    async fn persist_failure_surfaces() {
        let (slot, record) = slot();
        let mut storage = MockStoragePort::new();
        storage
            .expect_save()
            .returning(|_, _| Err(StorageError::Backend("disk full".into())));
        let controller = LifecycleController::new(Arc::new(storage), None);

        let result = controller.apply(&slot, &record, TerminalAction::Persist).await;
        assert!(matches!(result, Err(RegistryError::Storage(_))));
    }

    #[tokio::test]
    async fn reported_decision_unpins() {
        let (slot, record) = slot();
        let mut storage = MockStoragePort::new();
        storage.expect_save().times(1).returning(|_, _| Ok(()));
        let controller = LifecycleController::new(Arc::new(storage), None);

        let cx = context(&slot);
        let ticket = cx.go_background();
        let action = controller.finish(&slot, &record, &cx).await.unwrap();
        assert_eq!(action, PostAction::Background);
        assert!(slot.is_in_background());

        // Reuse the waiter spawned by `finish` by reporting on the ticket.
        assert!(ticket.complete(TerminalAction::Persist));
        for _ in 0..100 {
            if !slot.is_in_background() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!slot.is_in_background());
    }

    #[tokio::test]
    async fn dropped_ticket_leaves_message_and_unpins() {
        let (slot, _) = slot();
        let controller = LifecycleController::new(Arc::new(MockStoragePort::new()), None);

        let cx = context(&slot);
        let ticket = cx.go_background();
        let (_, completion) = cx.take_decision();
        let waiter = controller.enter_background(Arc::clone(&slot), completion);
        drop(ticket);
        waiter.await.unwrap();

        assert!(!slot.is_in_background());
        let messages = slot.messages().peek();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text.contains("without reporting"));
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_unpins_silent_worker() {
        let (slot, _) = slot();
        let controller =
            LifecycleController::new(Arc::new(MockStoragePort::new()), Some(Duration::from_secs(30)));

        let cx = context(&slot);
        let ticket = cx.go_background();
        let (_, completion) = cx.take_decision();
        let waiter = controller.enter_background(Arc::clone(&slot), completion);
        waiter.await.unwrap();

        assert!(!slot.is_in_background());
        assert!(slot.messages().peek()[0].text.contains("timed out"));
        assert!(!ticket.complete(TerminalAction::Persist));
    }

    #[tokio::test]
    async fn retired_slot_is_never_persisted() {
        let (slot, _) = slot();
        // No save expectation: any write fails the test.
        let controller = LifecycleController::new(Arc::new(MockStoragePort::new()), None);

        let cx = context(&slot);
        let ticket = cx.go_background();
        let (_, completion) = cx.take_decision();
        let waiter = controller.enter_background(Arc::clone(&slot), completion);
        slot.mark_retired();
        assert!(ticket.complete(TerminalAction::Persist));
        waiter.await.unwrap();

        assert!(!slot.is_in_background());
    }
}
