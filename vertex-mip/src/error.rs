//! Error types for the MIP layer.

use thiserror::Error;

/// Errors that can occur during MIP solving.
#[derive(Error, Debug)]
pub enum MipError {
    /// Problem validation failed.
    #[error("invalid problem: {0}")]
    InvalidProblem(String),

    /// The LP engine failed on a node relaxation.
    #[error("relaxation solve failed: {0}")]
    RelaxationError(String),

    /// Internal solver error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<vertex_core::SolveError> for MipError {
    fn from(err: vertex_core::SolveError) -> Self {
        match err {
            vertex_core::SolveError::InvalidInput(message) => MipError::InvalidProblem(message),
            vertex_core::SolveError::Internal(message) => MipError::Internal(message),
        }
    }
}

/// Result type for MIP operations.
pub type MipResult<T> = Result<T, MipError>;
