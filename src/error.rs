//! Error types for the apex-cholesky library
//!
//! This module provides the main error and result types used throughout the library.
//! All errors use the `thiserror` crate for automatic trait implementations.

use crate::linalg::{LinAlgError, LinearSolverError};
use thiserror::Error;

/// Main result type used throughout the apex-cholesky library
pub type ApexCholeskyResult<T> = Result<T, ApexCholeskyError>;

/// Main error type for the apex-cholesky library
#[derive(Debug, Clone, Error)]
pub enum ApexCholeskyError {
    /// Matrix construction and structural errors
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// Numerical failure of a factorization or solve (retryable)
    #[error("Solver failure: {0}")]
    SolverFailure(String),

    /// Non-recoverable solver error (bad configuration, symbolic failure, misuse)
    #[error("Fatal solver error: {0}")]
    SolverFatal(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<LinAlgError> for ApexCholeskyError {
    fn from(err: LinAlgError) -> Self {
        match err {
            LinAlgError::InvalidInput(msg) => ApexCholeskyError::InvalidInput(msg),
            other => ApexCholeskyError::LinearAlgebra(other.to_string()),
        }
    }
}

impl From<LinearSolverError> for ApexCholeskyError {
    fn from(err: LinearSolverError) -> Self {
        match err {
            LinearSolverError::Failure(msg) => ApexCholeskyError::SolverFailure(msg),
            LinearSolverError::Fatal(msg) => ApexCholeskyError::SolverFatal(msg),
        }
    }
}
