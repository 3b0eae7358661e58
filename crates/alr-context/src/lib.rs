//! ALR Context
//!
//! Everything an operation sees while it runs.
//!
//! # Core Concepts
//!
//! - [`CallContext`]: created fresh per operation
//! - [`PostAction`] / [`TerminalAction`]: what happens to the artifact afterwards
//! - [`BackgroundTicket`]: single-shot handle a detached worker reports on
//! - [`MessageLog`]: per-artifact background messages
//! - [`DataProvider`]: keyed capabilities on the blackboard
//!
//! # Example
//!
//! ```
//! use alr_context::{CallContext, MessageLog, PostAction, TerminalAction};
//! use alr_core::CallMeta;
//!
//! let cx = CallContext::new(CallMeta::new(), MessageLog::new());
//! cx.set_post_action(TerminalAction::Persist);
//! assert_eq!(cx.post_action(), PostAction::Persist);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod background;
mod context;
mod decision;
mod messages;
mod provider;

pub use background::{BackgroundCompletion, BackgroundOutcome, BackgroundTicket};
pub use context::CallContext;
pub use decision::{PostAction, TerminalAction};
pub use messages::{BackgroundMessage, MessageLevel, MessageLog};
pub use provider::{DataProvider, ProviderError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
