//! Build results as reported by a bundler run.

use serde::{Deserialize, Serialize};

/// A single error reported by the bundler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildError {
    /// Module (usually a file path) the error is attributed to, if known.
    pub module: Option<String>,
    /// Raw error text as the bundler produced it.
    pub message: String,
}

impl BuildError {
    /// Creates an error without a module attribution.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            module: None,
            message: message.into(),
        }
    }

    /// Creates an error attributed to a module.
    pub fn in_module(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            message: message.into(),
        }
    }
}

/// The outcome of one build cycle.
///
/// A result is consumed by the recompilation state machine and then dropped;
/// nothing downstream keeps it around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Whether the bundler reported success.
    pub success: bool,
    /// Errors in the order the bundler reported them.
    pub errors: Vec<BuildError>,
    /// Content-addressed fingerprint of the produced output.
    pub hash: String,
}

impl BuildResult {
    /// A successful build with the given output hash.
    pub fn success(hash: impl Into<String>) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            hash: hash.into(),
        }
    }

    /// A failed build.
    pub fn failure(hash: impl Into<String>, errors: Vec<BuildError>) -> Self {
        Self {
            success: false,
            errors,
            hash: hash.into(),
        }
    }

    /// True when the build failed and carries at least one error.
    pub fn has_errors(&self) -> bool {
        !self.success && !self.errors.is_empty()
    }

    /// The first reported error, which is the one shown to humans.
    pub fn primary_error(&self) -> Option<&BuildError> {
        self.errors.first()
    }
}
