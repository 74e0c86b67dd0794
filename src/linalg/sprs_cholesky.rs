//! Sparse Cholesky backed by the simplicial LDLᵀ of `sprs-ldl`.
//!
//! LDLᵀ also succeeds on many indefinite matrices, so positive definiteness
//! is checked on the computed `D` after every numeric factorization.
//!
//! With natural ordering the matrix is handed over as a CSC view of the
//! upper triangle, obtained by reading the lower compressed-row arrays
//! column-major. A permuted factorization reads entries from both triangles,
//! so under reverse Cuthill-McKee the pattern is expanded to the full
//! symmetric matrix once and only the values are gathered afterwards.

use sprs::{CsMatView, FillInReduction, SymmetryCheck};
use sprs_ldl::{Ldl, LdlNumeric, LdlSymbolic};
use tracing::{debug, warn};

use super::sparse_cholesky::{SparseCholesky, check_lhs, check_vectors};
use super::symmetric_expansion::SymmetricExpansion;
use super::{LinearSolverError, LinearSolverResult, OrderingType};
use crate::matrix::{CompressedRowSparseMatrix, StorageType};

pub struct SprsLdlCholesky {
    ordering_type: OrderingType,
    symbolic: Option<LdlSymbolic<usize>>,
    numeric: Option<LdlNumeric<f64, usize>>,
    expansion: Option<SymmetricExpansion>,
    full_values: Vec<f64>,
    dimension: usize,
    num_nonzeros: usize,
}

impl SprsLdlCholesky {
    pub fn new(ordering_type: OrderingType) -> Self {
        Self {
            ordering_type,
            symbolic: None,
            numeric: None,
            expansion: None,
            full_values: Vec::new(),
            dimension: 0,
            num_nonzeros: 0,
        }
    }

    pub fn is_factorized(&self) -> bool {
        self.numeric.is_some()
    }

    fn fill_in_reduction(ordering_type: OrderingType) -> LinearSolverResult<FillInReduction> {
        match ordering_type {
            OrderingType::Natural => Ok(FillInReduction::NoReduction),
            OrderingType::ReverseCuthillMcKee => Ok(FillInReduction::ReverseCuthillMcKee),
            OrderingType::Amd | OrderingType::NestedDissection => Err(LinearSolverError::Fatal(
                format!("sprs-ldl: {ordering_type:?} ordering is not available"),
            )),
        }
    }

    fn csc_view<'a>(
        n: usize,
        col_ptrs: &'a [usize],
        row_indices: &'a [usize],
        values: &'a [f64],
    ) -> LinearSolverResult<CsMatView<'a, f64>> {
        CsMatView::try_new_csc((n, n), col_ptrs, row_indices, values).map_err(|(_, _, _, err)| {
            LinearSolverError::Fatal(format!("sprs-ldl: invalid matrix: {err:?}"))
        })
    }
}

impl SparseCholesky for SprsLdlCholesky {
    fn name(&self) -> &'static str {
        "sprs-ldl"
    }

    fn storage_type(&self) -> StorageType {
        StorageType::LowerTriangular
    }

    fn factorize(&mut self, lhs: &CompressedRowSparseMatrix) -> LinearSolverResult<()> {
        check_lhs(self.name(), self.storage_type(), lhs)?;
        let fill_in_reduction = Self::fill_in_reduction(self.ordering_type)?;
        let n = lhs.num_rows();

        if self.symbolic.is_some() && (self.dimension != n || self.num_nonzeros != lhs.num_nonzeros())
        {
            return Err(LinearSolverError::Fatal(format!(
                "sprs-ldl: sparsity pattern changed ({} -> {} non-zeros); create a new factorization",
                self.num_nonzeros,
                lhs.num_nonzeros()
            )));
        }

        let matrix = if fill_in_reduction == FillInReduction::NoReduction {
            let view = lhs.transposed_view();
            Self::csc_view(n, view.col_ptrs(), view.row_indices(), view.values())?
        } else {
            let expansion = match self.expansion.take() {
                Some(expansion) if expansion.matches(lhs) => expansion,
                _ => SymmetricExpansion::from_lower(lhs),
            };
            let expansion = self.expansion.insert(expansion);
            expansion.gather(lhs.values(), &mut self.full_values, |v| v);
            Self::csc_view(n, &expansion.offsets, &expansion.indices, &self.full_values)?
        };

        if self.symbolic.is_none() {
            let symbolic = Ldl::new()
                .fill_in_reduction(fill_in_reduction)
                .check_symmetry(SymmetryCheck::DontCheckSymmetry)
                .symbolic(matrix.view());
            debug!(
                "sprs-ldl symbolic analysis ({:?}): n = {}, nnz(A) = {}, nnz(L) = {}",
                self.ordering_type,
                n,
                matrix.nnz(),
                symbolic.nnz()
            );
            self.symbolic = Some(symbolic);
            self.dimension = n;
            self.num_nonzeros = lhs.num_nonzeros();
        }

        // The first factorization consumes a copy of the symbolic analysis,
        // later ones update the numeric factor in place.
        let result = if let Some(numeric) = self.numeric.as_mut() {
            numeric.update(matrix)
        } else if let Some(symbolic) = self.symbolic.as_ref() {
            symbolic
                .clone()
                .factor(matrix)
                .map(|numeric| self.numeric = Some(numeric))
        } else {
            return Err(LinearSolverError::Fatal(
                "sprs-ldl: symbolic factorization missing".into(),
            ));
        };

        if let Err(err) = result {
            self.numeric = None;
            warn!("sprs-ldl numeric factorization failed: {err:?}");
            return Err(LinearSolverError::Failure(format!(
                "sprs-ldl: numeric factorization failed ({err:?})"
            )));
        }

        let min_pivot = self
            .numeric
            .as_ref()
            .map(|numeric| numeric.d().iter().copied().fold(f64::INFINITY, f64::min))
            .unwrap_or(f64::NAN);
        if min_pivot.is_nan() || min_pivot <= 0.0 {
            self.numeric = None;
            warn!("sprs-ldl: non-positive pivot {min_pivot}");
            return Err(LinearSolverError::Failure(format!(
                "sprs-ldl: matrix is not positive definite (smallest pivot {min_pivot:e})"
            )));
        }
        Ok(())
    }

    fn solve(&mut self, rhs: &[f64], solution: &mut [f64]) -> LinearSolverResult<()> {
        let Some(numeric) = self.numeric.as_ref() else {
            return Err(LinearSolverError::Fatal(
                "sprs-ldl: solve called without a successful factorization".into(),
            ));
        };
        check_vectors(self.name(), self.dimension, rhs, solution)?;

        let x = numeric.solve(rhs);
        solution.copy_from_slice(&x);
        Ok(())
    }
}
