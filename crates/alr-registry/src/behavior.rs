//! Domain ports: factories create artifacts, behaviors run their operations
//!
//! The registry never interprets artifact data. Everything an artifact
//! computes happens behind [`ArtifactBehavior`].

use crate::slot::ArtifactCell;
use alr_context::{BackgroundTicket, CallContext, ProviderError};
use alr_core::{ArtifactRecord, ArtifactTypeId, Document};
use alr_graph::State;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Failures raised by domain code
#[derive(Debug, thiserror::Error)]
pub enum BehaviorError {
    /// The operation ran and failed
    #[error("operation failed: {0}")]
    Failed(String),

    /// The input document was rejected
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The artifact cannot produce this output
    #[error("unsupported output {output_type} ({format})")]
    UnsupportedOutput { output_type: String, format: String },

    /// A blackboard provider failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BehaviorError {
    /// Behavior-level failure with a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// The behavior has no renderer for this output type and format
    pub fn unsupported_output(output_type: &str, format: &str) -> Self {
        Self::UnsupportedOutput {
            output_type: output_type.to_string(),
            format: format.to_string(),
        }
    }
}

/// What an operation runs against
pub struct Operation<'a> {
    /// The locked record
    pub record: &'a mut ArtifactRecord,
    /// Context of this call
    pub context: &'a CallContext,
    cell: ArtifactCell,
}

impl<'a> Operation<'a> {
    /// Wrap the locked record for one behavior call
    pub fn new(
        record: &'a mut ArtifactRecord,
        context: &'a CallContext,
        cell: ArtifactCell,
    ) -> Self {
        Self {
            record,
            context,
            cell,
        }
    }

    /// Go to background.
    ///
    /// Returns the record cell the worker locks to write results once this
    /// operation has returned, and the ticket it must report on.
    pub fn background(&self) -> (ArtifactCell, BackgroundTicket) {
        (Arc::clone(&self.cell), self.context.go_background())
    }
}

/// Per-type operations on a live artifact
#[async_trait]
pub trait ArtifactBehavior: Send + Sync {
    /// Structured description; defaults to the artifact's data
    async fn describe(
        &self,
        op: Operation<'_>,
        _input: &Document,
    ) -> Result<Document, BehaviorError> {
        Ok(op.record.data().clone())
    }

    /// Accept input. The default merges an input object into the data
    /// object key by key.
    async fn feed(&self, op: Operation<'_>, input: Document) -> Result<(), BehaviorError> {
        let Document::Object(fields) = input else {
            return Err(BehaviorError::InvalidInput("expected an object".into()));
        };
        op.record.update_data(|data| {
            if !data.is_object() {
                *data = Document::Object(serde_json::Map::new());
            }
            if let Document::Object(map) = data {
                map.extend(fields);
            }
        });
        Ok(())
    }

    /// Domain work for `from -> to`. The state is committed only after this
    /// returns `Ok`.
    async fn advance(
        &self,
        _op: Operation<'_>,
        _from: &State,
        _to: &State,
    ) -> Result<(), BehaviorError> {
        Ok(())
    }

    async fn produce_output(
        &self,
        _op: Operation<'_>,
        output_type: &str,
        format: &str,
    ) -> Result<Vec<u8>, BehaviorError> {
        Err(BehaviorError::unsupported_output(output_type, format))
    }

    /// Runs when the artifact expires or is deleted
    async fn end_of_life(&self, _record: &ArtifactRecord) {}

    /// Runs after [`ArtifactBehavior::end_of_life`]
    async fn cleanup(&self, _record: &ArtifactRecord) {}
}

/// Creates and restores artifacts of one type
#[async_trait]
pub trait ArtifactFactory: Send + Sync {
    /// Name clients create artifacts by
    fn name(&self) -> &str;

    fn artifact_type(&self) -> &ArtifactTypeId;

    /// Initial data for a new artifact
    async fn create(&self, context: &CallContext, input: &Document)
        -> Result<Document, BehaviorError>;

    /// Idle time after which the artifact is reclaimed; `None` keeps it forever.
    /// Asked once, at creation or restore.
    fn time_to_live_untouched(&self, _record: &ArtifactRecord) -> Option<Duration> {
        None
    }

    fn behavior(&self) -> Arc<dyn ArtifactBehavior>;

    /// Adjust a record read back from storage
    fn restore(&self, record: ArtifactRecord) -> Result<ArtifactRecord, BehaviorError> {
        Ok(record)
    }
}
