//! Unified error types for the remedial-action optimization ecosystem
//!
//! This module provides a common error type [`RaoError`] that can represent
//! errors from any part of the engine. Domain-specific error types can be
//! converted to `RaoError` for uniform error handling at API boundaries.
//!
//! The taxonomy matters for control flow: sensitivity failures are
//! recoverable once per exploration branch, solver failures kill only the
//! current branch, and configuration errors abort the whole run at setup.

use thiserror::Error;

/// Unified error type for all remedial-action optimization operations.
#[derive(Error, Debug)]
pub enum RaoError {
    /// Sensitivity computation failed with the active parameter set.
    ///
    /// Recoverable once per exploration branch through fallback parameters;
    /// fatal for the branch on a second failure.
    #[error("Sensitivity computation failed: {0}")]
    Sensitivity(String),

    /// The linear solver returned a non-optimal status.
    ///
    /// Always fatal for the current search-tree leaf, never for its siblings.
    #[error("Linear solver returned {status}: {message}")]
    Solver { status: String, message: String },

    /// Invalid configuration, detected at setup time and never silently
    /// corrected (usage-limit cross-checks, filler ordering violations).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A referenced model element (CNEC, remedial action, …) does not exist.
    #[error("Unknown element: {0}")]
    UnknownElement(String),

    /// A state-pool handle that was already released or never issued.
    #[error("Invalid network-state handle: {0}")]
    InvalidHandle(usize),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type RaoResult<T> = Result<T, RaoError>;

impl From<anyhow::Error> for RaoError {
    fn from(err: anyhow::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}

impl From<String> for RaoError {
    fn from(s: String) -> Self {
        RaoError::Other(s)
    }
}

impl From<&str> for RaoError {
    fn from(s: &str) -> Self {
        RaoError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RaoError::Sensitivity("divergence on N-1 case".into());
        assert!(err.to_string().contains("Sensitivity computation failed"));
        assert!(err.to_string().contains("divergence on N-1 case"));
    }

    #[test]
    fn test_solver_error_display() {
        let err = RaoError::Solver {
            status: "Infeasible".into(),
            message: "primal infeasible".into(),
        };
        assert!(err.to_string().contains("Infeasible"));
        assert!(err.to_string().contains("primal infeasible"));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> RaoResult<()> {
            Err(RaoError::Config("bad cap".into()))
        }

        fn outer() -> RaoResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
