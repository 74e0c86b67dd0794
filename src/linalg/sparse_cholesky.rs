//! Backend-agnostic sparse Cholesky interface and runtime factory.
//!
//! A [`SparseCholesky`] performs the symbolic analysis once on the first
//! [`factorize`](SparseCholesky::factorize) call and caches it; every call
//! refreshes the numeric factorization. Callers must therefore keep the
//! sparsity pattern fixed for the lifetime of an instance and create a new
//! one when it changes.

use tracing::debug;

use super::{
    FaerCholesky, LinearSolverError, LinearSolverOptions, LinearSolverResult,
    LinearSolverSummary, NalgebraCholesky, SparseLinearAlgebraLibraryType, SprsLdlCholesky,
};
use crate::matrix::{CompressedRowSparseMatrix, StorageType};

pub trait SparseCholesky: Send {
    /// Backend name used in logs and messages.
    fn name(&self) -> &'static str;

    /// The triangle `factorize` expects the matrix to be stored in.
    fn storage_type(&self) -> StorageType;

    /// Computes the numeric factorization of `lhs`, running the symbolic
    /// analysis first if this is the first call.
    ///
    /// Returns [`LinearSolverError::Fatal`] when the symbolic analysis fails
    /// or `lhs` does not match the expected storage, and
    /// [`LinearSolverError::Failure`] when `lhs` is not positive definite.
    fn factorize(&mut self, lhs: &CompressedRowSparseMatrix) -> LinearSolverResult<()>;

    /// Solves `lhs·solution = rhs` with the factorization from the last
    /// successful [`factorize`](Self::factorize).
    fn solve(&mut self, rhs: &[f64], solution: &mut [f64]) -> LinearSolverResult<()>;

    /// Factorizes `lhs` and, if that succeeds, solves for `solution`.
    fn factor_and_solve(
        &mut self,
        lhs: &CompressedRowSparseMatrix,
        rhs: &[f64],
        solution: &mut [f64],
    ) -> LinearSolverSummary {
        match self
            .factorize(lhs)
            .and_then(|()| self.solve(rhs, solution))
        {
            Ok(()) => LinearSolverSummary::success("Success."),
            Err(err) => LinearSolverSummary::from_error(&err),
        }
    }
}

/// Checks the requirements every backend shares before touching `lhs`.
pub(crate) fn check_lhs(
    name: &str,
    expected_storage: StorageType,
    lhs: &CompressedRowSparseMatrix,
) -> LinearSolverResult<()> {
    if lhs.num_rows() != lhs.num_cols() {
        return Err(LinearSolverError::Fatal(format!(
            "{name}: matrix must be square, got {}x{}",
            lhs.num_rows(),
            lhs.num_cols()
        )));
    }
    if lhs.storage_type() != expected_storage {
        return Err(LinearSolverError::Fatal(format!(
            "{name}: expected {expected_storage:?} storage, got {:?}",
            lhs.storage_type()
        )));
    }
    lhs.validate_structure()
        .map_err(|err| LinearSolverError::Fatal(format!("{name}: {err}")))
}

/// Checks the vectors passed to `solve` against the factorized dimension.
pub(crate) fn check_vectors(
    name: &str,
    dimension: usize,
    rhs: &[f64],
    solution: &[f64],
) -> LinearSolverResult<()> {
    if rhs.len() != dimension || solution.len() != dimension {
        return Err(LinearSolverError::Fatal(format!(
            "{name}: rhs ({}) and solution ({}) must have length {dimension}",
            rhs.len(),
            solution.len()
        )));
    }
    Ok(())
}

/// Creates the backend selected by `options`.
///
/// Combinations the backend cannot honor (an unavailable ordering, mixed
/// precision on a double-only backend) are rejected with
/// [`LinearSolverError::Fatal`] rather than silently replaced.
pub fn create_sparse_cholesky(
    options: &LinearSolverOptions,
) -> LinearSolverResult<Box<dyn SparseCholesky>> {
    let library = options.sparse_linear_algebra_library_type;
    let ordering_type = options.ordering_type;

    if !library.is_ordering_available(ordering_type) {
        return Err(LinearSolverError::Fatal(format!(
            "{library} does not support {ordering_type:?} ordering"
        )));
    }
    if options.use_mixed_precision_solves && !library.supports_mixed_precision() {
        return Err(LinearSolverError::Fatal(format!(
            "{library} does not support mixed precision solves"
        )));
    }

    let cholesky: Box<dyn SparseCholesky> = match (library, options.use_mixed_precision_solves) {
        (SparseLinearAlgebraLibraryType::Faer, false) => {
            Box::new(FaerCholesky::<f64>::new(ordering_type))
        }
        (SparseLinearAlgebraLibraryType::Faer, true) => {
            Box::new(FaerCholesky::<f32>::new(ordering_type))
        }
        (SparseLinearAlgebraLibraryType::SprsLdl, _) => {
            Box::new(SprsLdlCholesky::new(ordering_type))
        }
        (SparseLinearAlgebraLibraryType::NalgebraSparse, false) => {
            Box::new(NalgebraCholesky::<f64>::new())
        }
        (SparseLinearAlgebraLibraryType::NalgebraSparse, true) => {
            Box::new(NalgebraCholesky::<f32>::new())
        }
    };

    debug!(
        "Created {} sparse Cholesky with {:?} ordering",
        cholesky.name(),
        ordering_type
    );
    Ok(cholesky)
}
