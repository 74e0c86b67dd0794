//! Sparse Cholesky backed by `nalgebra-sparse`.
//!
//! `CscCholesky` works on the full symmetric pattern, so the stored lower
//! triangle is expanded once into a full compressed pattern together with a
//! scatter map from every full slot back to its source value. Later
//! factorizations only gather values through that map.

use nalgebra::{DMatrix, RealField};
use nalgebra_sparse::factorization::{CscCholesky, CscSymbolicCholesky};
use nalgebra_sparse::pattern::SparsityPattern;
use tracing::{debug, warn};

use super::sparse_cholesky::{SparseCholesky, check_lhs, check_vectors};
use super::symmetric_expansion::SymmetricExpansion;
use super::{CholeskyScalar, LinearSolverError, LinearSolverResult};
use crate::matrix::{CompressedRowSparseMatrix, StorageType};

pub struct NalgebraCholesky<T>
where
    T: CholeskyScalar + RealField,
{
    expansion: Option<SymmetricExpansion>,
    symbolic: Option<CscSymbolicCholesky>,
    factor: Option<CscCholesky<T>>,
    full_values: Vec<T>,
}

impl<T> NalgebraCholesky<T>
where
    T: CholeskyScalar + RealField,
{
    pub fn new() -> Self {
        Self {
            expansion: None,
            symbolic: None,
            factor: None,
            full_values: Vec::new(),
        }
    }

    pub fn is_factorized(&self) -> bool {
        self.factor.is_some()
    }
}

impl<T> Default for NalgebraCholesky<T>
where
    T: CholeskyScalar + RealField,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SparseCholesky for NalgebraCholesky<T>
where
    T: CholeskyScalar + RealField,
{
    fn name(&self) -> &'static str {
        if T::PRECISION == "single" {
            "nalgebra-sparse (single)"
        } else {
            "nalgebra-sparse"
        }
    }

    fn storage_type(&self) -> StorageType {
        StorageType::LowerTriangular
    }

    fn factorize(&mut self, lhs: &CompressedRowSparseMatrix) -> LinearSolverResult<()> {
        check_lhs(self.name(), self.storage_type(), lhs)?;

        match self.expansion.as_ref() {
            Some(expansion) if !expansion.matches(lhs) => {
                return Err(LinearSolverError::Fatal(format!(
                    "nalgebra-sparse: sparsity pattern changed ({} -> {} non-zeros); \
                     create a new factorization",
                    expansion.num_lower_nonzeros(),
                    lhs.num_nonzeros()
                )));
            }
            Some(_) => {}
            None => {
                let expansion = SymmetricExpansion::from_lower(lhs);
                let n = expansion.dimension();
                let pattern = SparsityPattern::try_from_offsets_and_indices(
                    n,
                    n,
                    expansion.offsets.clone(),
                    expansion.indices.clone(),
                )
                .map_err(|err| {
                    LinearSolverError::Fatal(format!("nalgebra-sparse: invalid pattern: {err:?}"))
                })?;
                debug!(
                    "nalgebra-sparse symbolic analysis: n = {}, nnz(A) = {}",
                    n,
                    pattern.nnz()
                );
                self.symbolic = Some(CscSymbolicCholesky::factor(pattern));
                self.expansion = Some(expansion);
            }
        }
        if let Some(expansion) = self.expansion.as_ref() {
            expansion.gather(lhs.values(), &mut self.full_values, |v| {
                <T as CholeskyScalar>::from_double(v)
            });
        }

        let result = if let Some(factor) = self.factor.as_mut() {
            factor.refactor(&self.full_values)
        } else if let Some(symbolic) = self.symbolic.as_ref() {
            CscCholesky::factor_numerical(symbolic.clone(), &self.full_values)
                .map(|factor| self.factor = Some(factor))
        } else {
            return Err(LinearSolverError::Fatal(
                "nalgebra-sparse: symbolic factorization missing".into(),
            ));
        };

        result.map_err(|err| {
            self.factor = None;
            warn!("nalgebra-sparse numeric factorization failed: {err:?}");
            LinearSolverError::Failure(format!(
                "nalgebra-sparse: numeric factorization failed, matrix is not positive definite \
                 ({err:?})"
            ))
        })
    }

    fn solve(&mut self, rhs: &[f64], solution: &mut [f64]) -> LinearSolverResult<()> {
        let Some(factor) = self.factor.as_ref() else {
            return Err(LinearSolverError::Fatal(
                "nalgebra-sparse: solve called without a successful factorization".into(),
            ));
        };
        check_vectors(self.name(), factor.l().nrows(), rhs, solution)?;

        let mut x = DMatrix::from_iterator(
            rhs.len(),
            1,
            rhs.iter().map(|&v| <T as CholeskyScalar>::from_double(v)),
        );
        factor.solve_mut(&mut x);
        for (out, v) in solution.iter_mut().zip(x.iter()) {
            *out = CholeskyScalar::to_double(*v);
        }
        Ok(())
    }
}
