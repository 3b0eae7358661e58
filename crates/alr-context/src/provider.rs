//! Data providers
//!
//! Components exchange intermediate results through providers registered
//! on the call context under string keys.

use crate::context::CallContext;
use alr_core::Document;

/// Provider failures, propagated to the caller of `provide_data`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider ran and failed
    #[error("data provider '{key}' failed: {message}")]
    Failed { key: String, message: String },

    /// Nested `provide_data` calls exceeded the configured bound
    #[error("data provider '{key}' exceeded the nesting limit of {limit}")]
    DepthExceeded { key: String, limit: usize },
}

impl ProviderError {
    /// Provider for `key` ran and failed
    pub fn failed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Computes data on request.
///
/// Providers get the call context back, so they may ask the blackboard for
/// other keys while computing.
pub trait DataProvider: Send + Sync {
    fn provide_data(
        &self,
        key: &str,
        param: &Document,
        context: &CallContext,
    ) -> Result<Document, ProviderError>;
}

impl<F> DataProvider for F
where
    F: Fn(&str, &Document, &CallContext) -> Result<Document, ProviderError> + Send + Sync,
{
    fn provide_data(
        &self,
        key: &str,
        param: &Document,
        context: &CallContext,
    ) -> Result<Document, ProviderError> {
        self(key, param, context)
    }
}
