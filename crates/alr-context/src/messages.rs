//! Background message log
//!
//! Progress and error messages produced for one artifact. The log is shared
//! by every call context and background ticket of that artifact, so
//! messages written by a continuation are visible to the next describe.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Severity of a background message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Info,
    Error,
}

/// One human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundMessage {
    pub level: MessageLevel,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Arrival-ordered message list, cheap to clone (shared)
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    inner: Arc<Mutex<Vec<BackgroundMessage>>>,
}

impl MessageLog {
    /// Empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message
    pub fn push(&self, level: MessageLevel, text: impl Into<String>) {
        self.inner.lock().push(BackgroundMessage {
            level,
            text: text.into(),
            at: Utc::now(),
        });
    }

    /// Append an info message
    pub fn info(&self, text: impl Into<String>) {
        self.push(MessageLevel::Info, text);
    }

    /// Append an error message
    pub fn error(&self, text: impl Into<String>) {
        self.push(MessageLevel::Error, text);
    }

    /// Copy of all messages; the log is left intact
    #[must_use]
    pub fn peek(&self) -> Vec<BackgroundMessage> {
        self.inner.lock().clone()
    }

    /// Take all messages, leaving the log empty
    #[must_use]
    pub fn drain(&self) -> Vec<BackgroundMessage> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Drop everything without reading it
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of undrained messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing is waiting to be drained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
