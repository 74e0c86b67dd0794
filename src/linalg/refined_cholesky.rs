//! Sparse Cholesky decorator that applies iterative refinement after every solve.

use tracing::warn;

use super::{IterativeRefiner, LinearSolverError, LinearSolverResult, SparseCholesky};
use crate::matrix::{CompressedRowSparseMatrix, StorageType};

/// Wraps a [`SparseCholesky`] and refines each of its solutions.
///
/// The matrix passed to [`factorize`](SparseCholesky::factorize) is needed
/// again to compute residuals in [`solve`](SparseCholesky::solve), so the
/// decorator keeps its own copy: the pattern is copied on the first call and
/// only the values are refreshed afterwards.
pub struct RefinedSparseCholesky {
    sparse_cholesky: Box<dyn SparseCholesky>,
    iterative_refiner: Box<dyn IterativeRefiner>,
    lhs: Option<CompressedRowSparseMatrix>,
    unrefined: Vec<f64>,
}

impl RefinedSparseCholesky {
    pub fn new(
        sparse_cholesky: Box<dyn SparseCholesky>,
        iterative_refiner: Box<dyn IterativeRefiner>,
    ) -> Self {
        Self {
            sparse_cholesky,
            iterative_refiner,
            lhs: None,
            unrefined: Vec::new(),
        }
    }

    fn remember(&mut self, lhs: &CompressedRowSparseMatrix) {
        let refreshed = match self.lhs.as_mut() {
            Some(stored)
                if stored.rows() == lhs.rows()
                    && stored.cols() == lhs.cols()
                    && stored.storage_type() == lhs.storage_type() =>
            {
                stored.copy_values_from(lhs).is_ok()
            }
            _ => false,
        };
        if !refreshed {
            self.lhs = Some(lhs.clone());
        }
    }
}

impl SparseCholesky for RefinedSparseCholesky {
    fn name(&self) -> &'static str {
        self.sparse_cholesky.name()
    }

    fn storage_type(&self) -> StorageType {
        self.sparse_cholesky.storage_type()
    }

    fn factorize(&mut self, lhs: &CompressedRowSparseMatrix) -> LinearSolverResult<()> {
        self.remember(lhs);
        self.sparse_cholesky.factorize(lhs)
    }

    fn solve(&mut self, rhs: &[f64], solution: &mut [f64]) -> LinearSolverResult<()> {
        let Some(lhs) = self.lhs.as_ref() else {
            return Err(LinearSolverError::Fatal(
                "refined solve called before factorize".into(),
            ));
        };

        self.sparse_cholesky.solve(rhs, solution)?;

        self.unrefined.clear();
        self.unrefined.extend_from_slice(solution);
        if let Err(err) = self.iterative_refiner.refine(
            lhs,
            rhs,
            self.sparse_cholesky.as_mut(),
            solution,
        ) {
            warn!(
                "Iterative refinement failed, keeping the unrefined solution: {}",
                err.message()
            );
            solution.copy_from_slice(&self.unrefined);
        }
        Ok(())
    }
}
