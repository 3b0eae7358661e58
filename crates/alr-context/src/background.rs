//! Background handshake
//!
//! An operation that hands work to a detached task calls
//! [`CallContext::go_background`](crate::CallContext::go_background) and
//! moves the returned [`BackgroundTicket`] into that task. The lifecycle
//! controller keeps the matching [`BackgroundCompletion`] and waits on it off
//! the dispatch path.

use crate::decision::TerminalAction;
use crate::messages::MessageLog;
use std::time::Duration;
use tokio::sync::oneshot;

/// Single-shot completion handle held by the background worker.
///
/// Reporting consumes the ticket, so a worker reports at most once. Dropping
/// it without reporting counts as a failure.
#[derive(Debug)]
#[must_use = "dropping a ticket without reporting marks the background work as failed"]
pub struct BackgroundTicket {
    sender: oneshot::Sender<TerminalAction>,
    messages: MessageLog,
}

/// Controller side of a ticket
#[derive(Debug)]
pub struct BackgroundCompletion {
    receiver: oneshot::Receiver<TerminalAction>,
}

/// How a background continuation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundOutcome {
    /// The worker reported a terminal decision
    Reported(TerminalAction),
    /// The ticket was dropped without a report
    Dropped,
    /// The watchdog fired first
    TimedOut,
}

pub(crate) fn channel(messages: MessageLog) -> (BackgroundTicket, BackgroundCompletion) {
    let (sender, receiver) = oneshot::channel();
    (
        BackgroundTicket { sender, messages },
        BackgroundCompletion { receiver },
    )
}

impl BackgroundTicket {
    /// Message log of the artifact this ticket belongs to
    #[inline]
    #[must_use]
    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    /// Report the terminal decision.
    ///
    /// Returns `false` when nobody is waiting any more (the watchdog fired or
    /// the operation overrode its background request).
    pub fn complete(self, action: TerminalAction) -> bool {
        self.sender.send(action).is_ok()
    }

    /// Record a failure message, then report `action`
    pub fn fail(self, message: impl Into<String>, action: TerminalAction) -> bool {
        self.messages.error(message);
        self.complete(action)
    }
}

impl BackgroundCompletion {
    /// Wait for the worker, bounded by `timeout` when given
    pub async fn wait(self, timeout: Option<Duration>) -> BackgroundOutcome {
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.receiver).await {
                Ok(received) => received,
                Err(_) => return BackgroundOutcome::TimedOut,
            },
            None => self.receiver.await,
        };
        match received {
            Ok(action) => BackgroundOutcome::Reported(action),
            Err(_) => BackgroundOutcome::Dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reported_action_reaches_controller() {
        let (ticket, completion) = channel(MessageLog::new());
        tokio::spawn(async move {
            ticket.complete(TerminalAction::Persist);
        });
        assert_eq!(
            completion.wait(None).await,
            BackgroundOutcome::Reported(TerminalAction::Persist)
        );
    }

    #[tokio::test]
    async fn dropped_ticket_is_detected() {
        let (ticket, completion) = channel(MessageLog::new());
        drop(ticket);
        assert_eq!(completion.wait(None).await, BackgroundOutcome::Dropped);
    }

    #[tokio::test]
    async fn fail_writes_message_before_reporting() {
        let log = MessageLog::new();
        let (ticket, completion) = channel(log.clone());
        assert!(ticket.fail("upstream timed out", TerminalAction::None));
        assert_eq!(
            completion.wait(None).await,
            BackgroundOutcome::Reported(TerminalAction::None)
        );
        assert_eq!(log.peek()[0].text, "upstream timed out");
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_times_out_silent_worker() {
        let (ticket, completion) = channel(MessageLog::new());
        let outcome = completion.wait(Some(Duration::from_secs(5))).await;
        assert_eq!(outcome, BackgroundOutcome::TimedOut);
        assert!(!ticket.complete(TerminalAction::Touch));
    }
}
