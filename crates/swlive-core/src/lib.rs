//! swlive core - build results and recompilation decisions
//!
//! This crate holds the pieces of swlive that never touch a socket or a
//! process: the shape of a finished build, the scrubbing applied to error
//! text before anyone reads it, and the recompilation state machine that
//! turns a stream of build results into reload / wait / gate decisions.
//!
//! # Example
//!
//! ```
//! use swlive_core::{BuildMode, BuildResult, Decision, RecompilationState};
//!
//! let mut state = RecompilationState::new();
//!
//! // The first result only releases the startup gate.
//! let first = state.apply(&BuildResult::success("h1"), BuildMode::Development);
//! assert_eq!(first, Decision::FirstSuccess { hash: "h1".into() });
//!
//! // A changed hash afterwards asks clients to reload.
//! let next = state.apply(&BuildResult::success("h2"), BuildMode::Development);
//! assert_eq!(next, Decision::Reload { hash: "h2".into() });
//! ```

mod event;
mod recompile;
mod result;
mod scrub;

pub use event::LiveEvent;
pub use recompile::{BuildMode, Decision, RecompilationState};
pub use result::{BuildError, BuildResult};
pub use scrub::scrub_error_text;
