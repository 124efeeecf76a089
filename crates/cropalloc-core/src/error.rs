//! Unified error types for the allocation pipeline
//!
//! This module provides a common error type [`PlanError`] shared by every
//! planning component. Only three kinds of failure abort an optimization
//! call: input validation, data insufficiency, and internal invariant
//! violations. Everything operational (infeasible neighbors, phenology
//! misses, rejected adjustment instructions) is handled locally and reported
//! through the result payload instead.
//!
//! # Example
//!
//! ```ignore
//! use cropalloc_core::{PlanError, PlanResult};
//!
//! fn plan(problem: &PlanProblem) -> PlanResult<()> {
//!     validate(problem)?;
//!     optimize(problem)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all planning operations.
#[derive(Error, Debug)]
pub enum PlanError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Malformed request data (duplicate IDs, out-of-range ratios, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request is well-formed but the data cannot support planning
    /// (weather gap, missing stages, underivable temperature ceiling, ...)
    #[error("Insufficient data: {0}")]
    Data(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A scheduler emitted a solution that fails post-hoc validation
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using PlanError.
pub type PlanResult<T> = Result<T, PlanError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for PlanError {
    fn from(err: anyhow::Error) -> Self {
        PlanError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for PlanError {
    fn from(s: String) -> Self {
        PlanError::Other(s)
    }
}

impl From<&str> for PlanError {
    fn from(s: &str) -> Self {
        PlanError::Other(s.to_string())
    }
}

// JSON parsing errors
impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        PlanError::Parse(err.to_string())
    }
}
