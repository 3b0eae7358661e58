//! Runtime errors
//!
//! Every failure a client can see is a [`RuntimeError`]; adapters switch on
//! [`RuntimeError::kind`] to pick a protocol status.

use crate::config::ConfigError;
use alr_core::{ArtifactId, StateId, UserId};
use alr_registry::{BehaviorError, RegistryError};

/// Client-visible failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownArtifact,
    UnknownCollection,
    IllegalTransition,
    Busy,
    FactoryNotFound,
    Serialization,
    Provider,
    Behavior,
    UnknownUser,
    UnsupportedOutput,
    Config,
}

/// Main runtime error type
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Target is not reachable from the current state right now
    #[error("illegal transition for artifact {artifact}: {from} -> {to}")]
    IllegalTransition {
        artifact: ArtifactId,
        from: StateId,
        to: StateId,
    },

    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Writing an output to its sink failed
    #[error("output write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BehaviorError> for RuntimeError {
    fn from(error: BehaviorError) -> Self {
        Self::Registry(RegistryError::Behavior(error))
    }
}

impl RuntimeError {
    /// Stable category for callers that branch on failures
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            RuntimeError::UnknownUser(_) => ErrorKind::UnknownUser,
            RuntimeError::Config(_) => ErrorKind::Config,
            RuntimeError::Io(_) => ErrorKind::Serialization,
            RuntimeError::Registry(error) => match error {
                RegistryError::UnknownArtifact(_) => ErrorKind::UnknownArtifact,
                RegistryError::UnknownCollection(_) => ErrorKind::UnknownCollection,
                RegistryError::Busy(_) => ErrorKind::Busy,
                RegistryError::FactoryNotFound(_) => ErrorKind::FactoryNotFound,
                RegistryError::UnknownArtifactType(_) => ErrorKind::Config,
                RegistryError::Storage(_)
                | RegistryError::Serialization(_)
                | RegistryError::Record(_) => ErrorKind::Serialization,
                RegistryError::Behavior(behavior) => match behavior {
                    BehaviorError::Provider(_) => ErrorKind::Provider,
                    BehaviorError::UnsupportedOutput { .. } => ErrorKind::UnsupportedOutput,
                    BehaviorError::Serialization(_) => ErrorKind::Serialization,
                    BehaviorError::Failed(_) | BehaviorError::InvalidInput(_) => ErrorKind::Behavior,
                },
            },
        }
    }

    /// Whether retrying the same call later can succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, RuntimeError::Registry(error) if error.is_retryable())
    }
}
