//! Error types for the LP engine.

use thiserror::Error;

/// Errors surfaced at the solve entry point.
///
/// Resource limits and cancellation are not errors: they are reported
/// through [`crate::SolveStatus`] together with the partial solution.
#[derive(Error, Debug)]
pub enum SolveError {
    /// The problem data failed validation. Reported synchronously before
    /// any solver state is touched.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The engine could not recover from repeated numerical failures.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for solve operations.
pub type SolveResult<T> = Result<T, SolveError>;
