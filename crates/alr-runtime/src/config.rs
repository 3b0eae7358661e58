//! Runtime configuration
//!
//! Loaded once from TOML and passed to [`Runtime::builder`](crate::Runtime::builder).
//!
//! ```toml
//! default_post_action = "touch"
//! sweep_interval_ms = 30000
//! background_timeout_ms = 600000
//!
//! [[artifact_types]]
//! id = "X"
//! initial_state = "start"
//! states = ["ready", { id = "done", label = "Done" }]
//!
//! [[artifact_types.transitions]]
//! from = "start"
//! to = "ready"
//! guard = { kind = "requires_field", field = "foo" }
//! ```

use alr_context::TerminalAction;
use alr_graph::{ArtifactTypeConfig, GraphError, TransitionEngine};
use alr_registry::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid state graph: {0}")]
    Graph(#[from] GraphError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Decision a fresh call context starts with
    pub default_post_action: TerminalAction,
    pub sweep_interval_ms: u64,
    /// Watchdog for background work; unset waits forever
    pub background_timeout_ms: Option<u64>,
    /// Bound on nested `provide_data` calls; unset means unbounded
    pub max_provider_depth: Option<usize>,
    /// Entries kept in the output cache
    pub output_cache_capacity: u64,
    /// TTL of new collections; unset keeps them forever
    pub collection_ttl_secs: Option<u64>,
    pub artifact_types: Vec<ArtifactTypeConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_post_action: TerminalAction::Touch,
            sweep_interval_ms: 30_000,
            background_timeout_ms: None,
            max_provider_depth: None,
            output_cache_capacity: 1024,
            collection_ttl_secs: None,
            artifact_types: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults with no artifact types configured
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate
    ///
    /// # Errors
    /// Malformed TOML or values that fail [`RuntimeConfig::validate`].
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// I/O failure or anything [`RuntimeConfig::from_toml_str`] rejects.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// # Errors
    /// [`ConfigError::Invalid`] for zero intervals, capacities or bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid("sweep_interval_ms must be positive".into()));
        }
        if self.background_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("background_timeout_ms must be positive".into()));
        }
        if self.max_provider_depth == Some(0) {
            return Err(ConfigError::Invalid("max_provider_depth must be positive".into()));
        }
        if self.output_cache_capacity == 0 {
            return Err(ConfigError::Invalid("output_cache_capacity must be positive".into()));
        }
        Ok(())
    }

    /// State graphs and transitions from `[[artifact_types]]`
    ///
    /// # Errors
    /// Duplicate types or states, or transitions naming undeclared states.
    pub fn build_engine(&self) -> Result<TransitionEngine, ConfigError> {
        Ok(TransitionEngine::from_config(&self.artifact_types)?)
    }

    /// Settings the registry needs
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            background_timeout: self.background_timeout_ms.map(Duration::from_millis),
            collection_ttl: self.collection_ttl_secs.map(Duration::from_secs),
        }
    }

    /// Decision applied when an operation leaves none
    #[must_use]
    pub fn with_default_post_action(mut self, action: TerminalAction) -> Self {
        self.default_post_action = action;
        self
    }

    /// Watchdog for background work
    #[must_use]
    pub fn with_background_timeout(mut self, timeout: Duration) -> Self {
        self.background_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Limit on nested data provider calls
    #[must_use]
    pub fn with_max_provider_depth(mut self, depth: usize) -> Self {
        self.max_provider_depth = Some(depth);
        self
    }

    /// Period of the expiry sweep
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Add or replace one artifact type
    #[must_use]
    pub fn with_artifact_type(mut self, artifact_type: ArtifactTypeConfig) -> Self {
        self.artifact_types.push(artifact_type);
        self
    }
}
