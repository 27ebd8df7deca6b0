//! The recompilation state machine.
//!
//! Every finished build is fed through [`RecompilationState::advance`], which
//! decides what the rest of the system should do with it. The machine only
//! has two phases (fresh and settled) but the order of its checks matters:
//!
//! 1. A failed build with errors is compared, after scrubbing, to the last
//!    error seen. Repeats are suppressed. New errors become a `wait` in
//!    development and a fatal stop in production. This branch never falls
//!    through to the hash check.
//! 2. A changed output hash releases the startup gate the first time (and
//!    always in production) and asks clients to reload afterwards.
//! 3. An unchanged hash does nothing.

use crate::event::LiveEvent;
use crate::result::BuildResult;
use crate::scrub::scrub_error_text;
use serde::{Deserialize, Serialize};

/// Whether the session is interactive (watching, serving clients) or a one-shot build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Interactive: watch for changes and keep going after errors.
    Development,
    /// Non-interactive: the first new error is fatal.
    Production,
}

impl BuildMode {
    /// Creates the mode from an interactive flag.
    pub fn from_interactive(interactive: bool) -> Self {
        if interactive {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn is_interactive(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Development => "development",
            Self::Production => "production",
        };
        write!(f, "{}", s)
    }
}

/// What to do with one build result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A new error in development: tell clients a reload is unsafe.
    Wait {
        module: Option<String>,
        error: String,
        hash: String,
    },

    /// A new error in production: report it and stop the process.
    Fatal {
        module: Option<String>,
        error: String,
    },

    /// New output after the session settled: tell clients to reload.
    Reload { hash: String },

    /// New output that releases the startup gate.
    ///
    /// Emitted for the first settled result, and for every changed output in
    /// production. Releasing an already released gate is a no-op.
    FirstSuccess { hash: String },

    /// Same scrubbed error text as last time.
    DuplicateError,

    /// Same output hash as last time.
    Unchanged,
}

impl Decision {
    /// The event to broadcast for this decision, if any.
    pub fn event(&self) -> Option<LiveEvent> {
        match self {
            Self::Wait { hash, .. } => Some(LiveEvent::Wait(hash.clone())),
            Self::Reload { hash } => Some(LiveEvent::Reload(hash.clone())),
            _ => None,
        }
    }
}

/// Recompilation bookkeeping for one orchestration session.
///
/// Created fresh per session and never reset; a new session (for example a
/// process restart) starts from [`RecompilationState::new`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecompilationState {
    has_built_before: bool,
    last_hash: Option<String>,
    last_error_text: Option<String>,
}

impl RecompilationState {
    /// Creates a fresh state: nothing built, no hash, no error.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once at least one result changed the output hash.
    pub fn is_settled(&self) -> bool {
        self.has_built_before
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    pub fn last_error_text(&self) -> Option<&str> {
        self.last_error_text.as_deref()
    }

    /// Computes the next state and the decision for `result`.
    ///
    /// This is a pure function of the current state and the result; `self`
    /// is left untouched.
    pub fn advance(&self, result: &BuildResult, mode: BuildMode) -> (Self, Decision) {
        let mut next = self.clone();

        if result.has_errors() {
            let primary = &result.errors[0];
            let text = scrub_error_text(&primary.message);

            if next.last_error_text.as_deref() == Some(text.as_str()) {
                return (next, Decision::DuplicateError);
            }

            next.last_error_text = Some(text.clone());

            let decision = if mode.is_interactive() {
                Decision::Wait {
                    module: primary.module.clone(),
                    error: text,
                    hash: result.hash.clone(),
                }
            } else {
                Decision::Fatal {
                    module: primary.module.clone(),
                    error: text,
                }
            };

            return (next, decision);
        }

        if next.last_hash.as_deref() == Some(result.hash.as_str()) {
            return (next, Decision::Unchanged);
        }

        let decision = if next.has_built_before && mode.is_interactive() {
            Decision::Reload {
                hash: result.hash.clone(),
            }
        } else {
            Decision::FirstSuccess {
                hash: result.hash.clone(),
            }
        };

        next.last_hash = Some(result.hash.clone());
        next.has_built_before = true;

        (next, decision)
    }

    /// Advances in place and returns the decision.
    pub fn apply(&mut self, result: &BuildResult, mode: BuildMode) -> Decision {
        let (next, decision) = self.advance(result, mode);
        *self = next;
        decision
    }
}
