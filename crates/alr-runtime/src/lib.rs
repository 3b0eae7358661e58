//! ALR Runtime
//!
//! The façade clients and protocol adapters call.
//!
//! # Core Concepts
//!
//! - [`Runtime`]: artifact, collection and user operations
//! - [`RuntimeConfig`]: TOML configuration, including state graphs
//! - [`RuntimeError`] / [`ErrorKind`]: the one error type clients see
//! - [`OutputWriter`]: produced output, cached by content hash
//!
//! # Example
//!
//! ```no_run
//! use alr_runtime::{Runtime, RuntimeConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RuntimeConfig::load("alr.toml")?;
//! let runtime = Runtime::builder(config).build()?;
//! let _sweeper = runtime.start_sweeper();
//! runtime.load_all_artifacts().await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod description;
mod error;
mod output;
mod runtime;
mod users;

pub use config::{ConfigError, RuntimeConfig};
pub use description::Description;
pub use error::{ErrorKind, RuntimeError};
pub use output::{OutputCache, OutputKey, OutputWriter};
pub use runtime::{Runtime, RuntimeBuilder};
pub use users::{InMemoryUserDirectory, User, UserDirectory};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
