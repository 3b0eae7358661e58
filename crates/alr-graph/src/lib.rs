//! ALR Graph
//!
//! State graphs and the transition engine.
//!
//! # Core Concepts
//!
//! - [`StateGraph`] / [`StateCatalog`]: declared states per artifact type
//! - [`Transition`]: a guarded edge between two states
//! - [`TransitionGuard`] / [`GuardSpec`]: validity predicates
//! - [`TransitionEngine`]: dynamic reachability and static closure
//!
//! # Example
//!
//! ```rust
//! use alr_graph::{StateGraph, Transition, TransitionEngine};
//! use alr_core::{ArtifactTypeId, StateId};
//!
//! let mut engine = TransitionEngine::default();
//! engine.add_state_graph(StateGraph::new("X", "start").with_states(["done"]).unwrap());
//! engine.add_transition("X", Transition::new("start", "done"));
//!
//! let closure = engine.all_recursive_successor_state_ids(
//!     &ArtifactTypeId::from("X"),
//!     &StateId::from("start"),
//! );
//! assert!(closure.contains(&StateId::from("done")));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod engine;
mod error;
mod guard;
mod state;
mod transition;

pub use engine::TransitionEngine;
pub use error::GraphError;
pub use guard::{GuardSpec, TransitionGuard};
pub use state::{State, StateCatalog, StateGraph};
pub use transition::{ArtifactTypeConfig, StateConfig, Transition, TransitionConfig};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
