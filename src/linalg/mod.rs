//! Sparse normal-equations core.
//!
//! This module provides the pieces needed to solve `AᵀA·x = Aᵀb` for a
//! block-sparse Jacobian `A`:
//! - [`InnerProductBuilder`]: computes the pattern of `AᵀA` once and refreshes its values
//! - [`SparseCholesky`]: backend-agnostic sparse Cholesky factorization
//!   ([`FaerCholesky`], [`SprsLdlCholesky`], [`NalgebraCholesky`])
//! - [`RefinedSparseCholesky`]: iterative refinement on top of any backend
//! - [`SparseNormalCholeskySolver`]: assembles, damps, factorizes and solves

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod faer_cholesky;
pub mod inner_product;
pub mod iterative_refiner;
pub mod nalgebra_cholesky;
pub mod normal_cholesky;
pub mod refined_cholesky;
pub mod sparse_cholesky;
pub mod sprs_cholesky;
mod symmetric_expansion;
pub mod workspace;

#[cfg(test)]
mod integration_tests;

pub use faer_cholesky::FaerCholesky;
pub use inner_product::InnerProductBuilder;
pub use iterative_refiner::{IterativeRefiner, SparseIterativeRefiner};
pub use nalgebra_cholesky::NalgebraCholesky;
pub use normal_cholesky::{ExecutionSummary, PerSolveOptions, SparseNormalCholeskySolver};
pub use refined_cholesky::RefinedSparseCholesky;
pub use sparse_cholesky::{SparseCholesky, create_sparse_cholesky};
pub use sprs_cholesky::SprsLdlCholesky;
pub use workspace::AlignedWorkspace;

/// Errors raised while building or validating matrices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinAlgError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),
}

pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Outcome class of a linear solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinearSolverTerminationType {
    /// The solve completed
    Success,
    /// Numerical failure, e.g. the matrix is not positive definite. The
    /// caller may retry with a modified matrix (more damping).
    Failure,
    /// Structural or configuration error. Retrying with the same inputs
    /// will fail again.
    FatalError,
}

impl fmt::Display for LinearSolverTerminationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinearSolverTerminationType::Success => write!(f, "SUCCESS"),
            LinearSolverTerminationType::Failure => write!(f, "FAILURE"),
            LinearSolverTerminationType::FatalError => write!(f, "FATAL_ERROR"),
        }
    }
}

/// Error returned by factorization backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinearSolverError {
    /// Recoverable numerical failure
    #[error("{0}")]
    Failure(String),

    /// Non-recoverable error
    #[error("{0}")]
    Fatal(String),
}

impl LinearSolverError {
    pub fn termination_type(&self) -> LinearSolverTerminationType {
        match self {
            LinearSolverError::Failure(_) => LinearSolverTerminationType::Failure,
            LinearSolverError::Fatal(_) => LinearSolverTerminationType::FatalError,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            LinearSolverError::Failure(msg) | LinearSolverError::Fatal(msg) => msg,
        }
    }
}

pub type LinearSolverResult<T> = Result<T, LinearSolverError>;

/// Result of a complete linear solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearSolverSummary {
    pub termination_type: LinearSolverTerminationType,
    pub message: String,
    pub num_iterations: usize,
}

impl LinearSolverSummary {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            termination_type: LinearSolverTerminationType::Success,
            message: message.into(),
            num_iterations: 1,
        }
    }

    pub fn from_error(error: &LinearSolverError) -> Self {
        Self {
            termination_type: error.termination_type(),
            message: error.message().to_string(),
            num_iterations: 1,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            termination_type: LinearSolverTerminationType::FatalError,
            message: message.into(),
            num_iterations: 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.termination_type == LinearSolverTerminationType::Success
    }
}

/// Fill-reducing ordering used by the symbolic factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderingType {
    /// No reordering
    Natural,
    /// Approximate minimum degree
    #[default]
    Amd,
    /// Nested dissection
    NestedDissection,
    /// Reverse Cuthill-McKee bandwidth reduction
    ReverseCuthillMcKee,
}

/// Sparse Cholesky backends available at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SparseLinearAlgebraLibraryType {
    /// Supernodal/simplicial LLᵀ from `faer`
    #[default]
    Faer,
    /// Simplicial LDLᵀ from `sprs-ldl`
    SprsLdl,
    /// Up-looking LLᵀ from `nalgebra-sparse`
    NalgebraSparse,
}

impl SparseLinearAlgebraLibraryType {
    pub fn is_ordering_available(self, ordering_type: OrderingType) -> bool {
        match self {
            SparseLinearAlgebraLibraryType::Faer => {
                matches!(ordering_type, OrderingType::Natural | OrderingType::Amd)
            }
            SparseLinearAlgebraLibraryType::SprsLdl => matches!(
                ordering_type,
                OrderingType::Natural | OrderingType::ReverseCuthillMcKee
            ),
            SparseLinearAlgebraLibraryType::NalgebraSparse => ordering_type == OrderingType::Natural,
        }
    }

    pub fn is_nested_dissection_available(self) -> bool {
        self.is_ordering_available(OrderingType::NestedDissection)
    }

    /// Whether the backend can factorize in single precision.
    pub fn supports_mixed_precision(self) -> bool {
        !matches!(self, SparseLinearAlgebraLibraryType::SprsLdl)
    }
}

impl fmt::Display for SparseLinearAlgebraLibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SparseLinearAlgebraLibraryType::Faer => write!(f, "faer"),
            SparseLinearAlgebraLibraryType::SprsLdl => write!(f, "sprs-ldl"),
            SparseLinearAlgebraLibraryType::NalgebraSparse => write!(f, "nalgebra-sparse"),
        }
    }
}

/// Configuration of the sparse normal-equations solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSolverOptions {
    pub sparse_linear_algebra_library_type: SparseLinearAlgebraLibraryType,
    pub ordering_type: OrderingType,
    /// Factorize in single precision and solve in double
    pub use_mixed_precision_solves: bool,
    /// Number of iterative refinement steps after each solve, 0 disables refinement
    pub max_num_refinement_iterations: usize,
}

impl Default for LinearSolverOptions {
    fn default() -> Self {
        Self {
            sparse_linear_algebra_library_type: SparseLinearAlgebraLibraryType::Faer,
            ordering_type: OrderingType::Amd,
            use_mixed_precision_solves: false,
            max_num_refinement_iterations: 0,
        }
    }
}

impl LinearSolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, library: SparseLinearAlgebraLibraryType) -> Self {
        self.sparse_linear_algebra_library_type = library;
        self
    }

    pub fn with_ordering(mut self, ordering_type: OrderingType) -> Self {
        self.ordering_type = ordering_type;
        self
    }

    pub fn with_mixed_precision(mut self, use_mixed_precision_solves: bool) -> Self {
        self.use_mixed_precision_solves = use_mixed_precision_solves;
        self
    }

    pub fn with_refinement_iterations(mut self, max_num_refinement_iterations: usize) -> Self {
        self.max_num_refinement_iterations = max_num_refinement_iterations;
        self
    }
}

/// Working precision of a factorization backend.
///
/// Backends store their factors in `Self`; the public interface always
/// exchanges `f64` slices, and the conversions below hide the difference.
pub trait CholeskyScalar: Copy + Send + Sync + fmt::Debug + 'static {
    /// Human readable precision name used in logs.
    const PRECISION: &'static str;

    fn from_double(value: f64) -> Self;

    fn to_double(self) -> f64;

    /// Returns `source` in working precision, using `scratch` when a cast is needed.
    fn cast_from_f64<'a>(source: &'a [f64], scratch: &'a mut Vec<Self>) -> &'a [Self];

    /// Copies `rhs` into working precision, runs `solve` on it in place and
    /// writes the result into `solution`.
    fn solve_with_working_copy<R>(
        rhs: &[f64],
        solution: &mut [f64],
        scratch: &mut Vec<Self>,
        solve: impl FnOnce(&mut [Self]) -> R,
    ) -> R;
}

impl CholeskyScalar for f64 {
    const PRECISION: &'static str = "double";

    fn from_double(value: f64) -> Self {
        value
    }

    fn to_double(self) -> f64 {
        self
    }

    fn cast_from_f64<'a>(source: &'a [f64], _scratch: &'a mut Vec<Self>) -> &'a [Self] {
        source
    }

    fn solve_with_working_copy<R>(
        rhs: &[f64],
        solution: &mut [f64],
        _scratch: &mut Vec<Self>,
        solve: impl FnOnce(&mut [Self]) -> R,
    ) -> R {
        solution.copy_from_slice(rhs);
        solve(solution)
    }
}

impl CholeskyScalar for f32 {
    const PRECISION: &'static str = "single";

    fn from_double(value: f64) -> Self {
        value as f32
    }

    fn to_double(self) -> f64 {
        self as f64
    }

    fn cast_from_f64<'a>(source: &'a [f64], scratch: &'a mut Vec<Self>) -> &'a [Self] {
        scratch.clear();
        scratch.extend(source.iter().map(|&v| v as f32));
        scratch
    }

    fn solve_with_working_copy<R>(
        rhs: &[f64],
        solution: &mut [f64],
        scratch: &mut Vec<Self>,
        solve: impl FnOnce(&mut [Self]) -> R,
    ) -> R {
        scratch.clear();
        scratch.extend(rhs.iter().map(|&v| v as f32));
        let result = solve(scratch);
        for (out, &v) in solution.iter_mut().zip(scratch.iter()) {
            *out = v as f64;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_solver_options_default() {
        let options = LinearSolverOptions::default();
        assert_eq!(
            options.sparse_linear_algebra_library_type,
            SparseLinearAlgebraLibraryType::Faer
        );
        assert_eq!(options.ordering_type, OrderingType::Amd);
        assert!(!options.use_mixed_precision_solves);
        assert_eq!(options.max_num_refinement_iterations, 0);
    }

    #[test]
    fn test_linear_solver_options_builders() {
        let options = LinearSolverOptions::new()
            .with_library(SparseLinearAlgebraLibraryType::NalgebraSparse)
            .with_ordering(OrderingType::Natural)
            .with_mixed_precision(true)
            .with_refinement_iterations(3);
        assert_eq!(
            options.sparse_linear_algebra_library_type,
            SparseLinearAlgebraLibraryType::NalgebraSparse
        );
        assert_eq!(options.ordering_type, OrderingType::Natural);
        assert!(options.use_mixed_precision_solves);
        assert_eq!(options.max_num_refinement_iterations, 3);
    }

    #[test]
    fn test_library_capabilities() {
        use SparseLinearAlgebraLibraryType::*;
        assert!(Faer.is_ordering_available(OrderingType::Amd));
        assert!(Faer.is_ordering_available(OrderingType::Natural));
        assert!(!SprsLdl.is_ordering_available(OrderingType::Amd));
        assert!(SprsLdl.is_ordering_available(OrderingType::ReverseCuthillMcKee));
        assert!(!Faer.is_ordering_available(OrderingType::ReverseCuthillMcKee));
        assert!(!NalgebraSparse.is_ordering_available(OrderingType::ReverseCuthillMcKee));
        assert!(NalgebraSparse.is_ordering_available(OrderingType::Natural));
        for library in [Faer, SprsLdl, NalgebraSparse] {
            assert!(!library.is_nested_dissection_available());
        }
        assert!(Faer.supports_mixed_precision());
        assert!(!SprsLdl.supports_mixed_precision());
    }

    #[test]
    fn test_error_termination_types() {
        let failure = LinearSolverError::Failure("not SPD".into());
        assert_eq!(failure.termination_type(), LinearSolverTerminationType::Failure);
        assert_eq!(failure.message(), "not SPD");

        let summary = LinearSolverSummary::from_error(&LinearSolverError::Fatal("bad".into()));
        assert_eq!(summary.termination_type, LinearSolverTerminationType::FatalError);
        assert_eq!(summary.message, "bad");
        assert_eq!(summary.num_iterations, 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_scalar_casts() {
        let source = [1.5, -2.25];
        let mut scratch64 = Vec::new();
        let cast64 = f64::cast_from_f64(&source, &mut scratch64);
        assert!(std::ptr::eq(cast64.as_ptr(), source.as_ptr()));

        let mut scratch32 = Vec::new();
        let cast32 = f32::cast_from_f64(&source, &mut scratch32);
        assert_eq!(cast32, &[1.5f32, -2.25f32]);

        let mut solution = [0.0; 2];
        f32::solve_with_working_copy(&source, &mut solution, &mut scratch32, |x| {
            for v in x.iter_mut() {
                *v *= 2.0;
            }
        });
        assert_eq!(solution, [3.0, -4.5]);
    }

    #[test]
    fn test_termination_type_display() {
        assert_eq!(LinearSolverTerminationType::FatalError.to_string(), "FATAL_ERROR");
        assert_eq!(SparseLinearAlgebraLibraryType::SprsLdl.to_string(), "sprs-ldl");
    }
}
