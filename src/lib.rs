//! Sparse Cholesky normal-equations core for nonlinear least squares.
//!
//! Solves `(AᵀA + DᵀD)·x = Aᵀb` for a block-sparse Jacobian `A` with
//! pluggable factorization backends and optional iterative refinement.
//! See [`linalg::SparseNormalCholeskySolver`] for the entry point.

pub mod error;
pub mod linalg;
pub mod logger;
pub mod matrix;

pub use error::{ApexCholeskyError, ApexCholeskyResult};
pub use linalg::{
    ExecutionSummary, InnerProductBuilder, LinearSolverOptions, LinearSolverSummary,
    LinearSolverTerminationType, OrderingType, PerSolveOptions, SparseCholesky,
    SparseLinearAlgebraLibraryType, SparseNormalCholeskySolver, create_sparse_cholesky,
};
pub use logger::{init_logger, init_logger_with_level};
pub use matrix::{BlockSparseMatrix, CompressedRowSparseMatrix, StorageType};
