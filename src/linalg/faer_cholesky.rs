//! Sparse Cholesky backed by faer's supernodal/simplicial LLᵀ.
//!
//! The symbolic factorization is computed with the requested ordering (AMD
//! or natural) on the first call and kept for the lifetime of the instance.
//! Factor values live in a vector sized once from the symbolic structure and
//! overwritten by every numeric factorization. Kernel scratch comes from two
//! [`AlignedWorkspace`]s, one for factorization and one for solves.
//!
//! The input is the lower triangle in compressed-row form. Read column-major
//! the same arrays are the upper triangle of the (symmetric) matrix, which is
//! what faer receives through a borrowed view, so no copy is made in double
//! precision.

use faer::linalg::cholesky::llt::factor::LltRegularization;
use faer::sparse::linalg::cholesky::{
    CholeskySymbolicParams, LltRef, SymbolicCholesky, SymmetricOrdering,
    factorize_symbolic_cholesky,
};
use faer::sparse::{SparseColMatRef, SymbolicSparseColMatRef};
use faer::traits::ComplexField;
use faer::{Conj, MatMut, Par, Side};
use tracing::{debug, warn};

use super::sparse_cholesky::{SparseCholesky, check_lhs, check_vectors};
use super::{
    AlignedWorkspace, CholeskyScalar, LinearSolverError, LinearSolverResult, OrderingType,
};
use crate::matrix::{CompressedRowSparseMatrix, StorageType};

pub struct FaerCholesky<T> {
    ordering_type: OrderingType,
    symbolic: Option<SymbolicCholesky<usize>>,
    dimension: usize,
    num_nonzeros: usize,
    factor_values: Vec<T>,
    is_factorized: bool,
    values_scratch: Vec<T>,
    rhs_scratch: Vec<T>,
    factorization_workspace: AlignedWorkspace,
    solve_workspace: AlignedWorkspace,
}

impl<T> FaerCholesky<T>
where
    T: CholeskyScalar + ComplexField,
{
    pub fn new(ordering_type: OrderingType) -> Self {
        Self {
            ordering_type,
            symbolic: None,
            dimension: 0,
            num_nonzeros: 0,
            factor_values: Vec::new(),
            is_factorized: false,
            values_scratch: Vec::new(),
            rhs_scratch: Vec::new(),
            factorization_workspace: AlignedWorkspace::new(),
            solve_workspace: AlignedWorkspace::new(),
        }
    }

    pub fn is_factorized(&self) -> bool {
        self.is_factorized
    }

    /// Non-zeros in the Cholesky factor, available after the symbolic analysis.
    pub fn factor_nonzeros(&self) -> Option<usize> {
        self.symbolic.as_ref().map(|s| s.len_val())
    }

    fn release(&mut self) {
        self.symbolic = None;
        self.factor_values = Vec::new();
        self.is_factorized = false;
    }

    fn analyze(
        &mut self,
        pattern: SymbolicSparseColMatRef<'_, usize>,
        num_nonzeros: usize,
    ) -> LinearSolverResult<()> {
        let ordering = match self.ordering_type {
            OrderingType::Natural => SymmetricOrdering::Identity,
            OrderingType::Amd => SymmetricOrdering::Amd,
            OrderingType::NestedDissection | OrderingType::ReverseCuthillMcKee => {
                return Err(LinearSolverError::Fatal(format!(
                    "faer: {:?} ordering is not available",
                    self.ordering_type
                )));
            }
        };

        match factorize_symbolic_cholesky(
            pattern,
            Side::Upper,
            ordering,
            CholeskySymbolicParams::default(),
        ) {
            Ok(symbolic) => {
                debug!(
                    "faer symbolic analysis ({:?}): n = {}, nnz(A) = {}, nnz(L) = {}",
                    self.ordering_type,
                    pattern.ncols(),
                    num_nonzeros,
                    symbolic.len_val()
                );
                self.factor_values = vec![T::from_double(0.0); symbolic.len_val()];
                self.symbolic = Some(symbolic);
                Ok(())
            }
            Err(err) => {
                self.release();
                Err(LinearSolverError::Fatal(format!(
                    "faer: symbolic factorization failed: {err:?}"
                )))
            }
        }
    }
}

impl<T> SparseCholesky for FaerCholesky<T>
where
    T: CholeskyScalar + ComplexField,
{
    fn name(&self) -> &'static str {
        if T::PRECISION == "single" {
            "faer (single)"
        } else {
            "faer"
        }
    }

    fn storage_type(&self) -> StorageType {
        StorageType::LowerTriangular
    }

    fn factorize(&mut self, lhs: &CompressedRowSparseMatrix) -> LinearSolverResult<()> {
        check_lhs(self.name(), self.storage_type(), lhs)?;

        let view = lhs.transposed_view();
        let n = view.dimension();
        let pattern = SymbolicSparseColMatRef::new_checked(
            n,
            n,
            view.col_ptrs(),
            None,
            view.row_indices(),
        );

        if self.symbolic.is_none() {
            self.analyze(pattern, lhs.num_nonzeros())?;
            self.dimension = n;
            self.num_nonzeros = lhs.num_nonzeros();
        } else if self.dimension != n || self.num_nonzeros != lhs.num_nonzeros() {
            return Err(LinearSolverError::Fatal(format!(
                "faer: sparsity pattern changed ({}x{} with {} non-zeros -> {n}x{n} with {}); \
                 create a new factorization",
                self.dimension,
                self.dimension,
                self.num_nonzeros,
                lhs.num_nonzeros()
            )));
        }

        let Some(symbolic) = self.symbolic.as_ref() else {
            return Err(LinearSolverError::Fatal(
                "faer: symbolic factorization missing".into(),
            ));
        };

        let values = T::cast_from_f64(view.values(), &mut self.values_scratch);
        let matrix = SparseColMatRef::new(pattern, values);

        let req = symbolic.factorize_numeric_llt_scratch::<T>(Par::Seq, Default::default());
        let stack = self.factorization_workspace.stack(req);

        let result = symbolic.factorize_numeric_llt(
            &mut self.factor_values,
            matrix,
            Side::Upper,
            LltRegularization::default(),
            Par::Seq,
            stack,
            Default::default(),
        );

        match result {
            Ok(_) => {
                self.is_factorized = true;
                Ok(())
            }
            Err(err) => {
                self.is_factorized = false;
                warn!("faer numeric factorization failed: {err:?}");
                Err(LinearSolverError::Failure(format!(
                    "faer: numeric factorization failed, matrix is not positive definite ({err:?})"
                )))
            }
        }
    }

    fn solve(&mut self, rhs: &[f64], solution: &mut [f64]) -> LinearSolverResult<()> {
        let symbolic = match (&self.symbolic, self.is_factorized) {
            (Some(symbolic), true) => symbolic,
            _ => {
                return Err(LinearSolverError::Fatal(
                    "faer: solve called without a successful factorization".into(),
                ));
            }
        };
        check_vectors(self.name(), self.dimension, rhs, solution)?;

        let req = symbolic.solve_in_place_scratch::<T>(1, Par::Seq);
        let stack = self.solve_workspace.stack(req);
        let llt = LltRef::<'_, usize, T>::new(symbolic, &self.factor_values);

        T::solve_with_working_copy(rhs, solution, &mut self.rhs_scratch, |x| {
            let n = x.len();
            let x = MatMut::from_column_major_slice_mut(x, n, 1);
            llt.solve_in_place_with_conj(Conj::No, x, Par::Seq, stack);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Lower triangle of the SPD matrix
    // [4 1 0 0]
    // [1 4 1 0]
    // [0 1 4 1]
    // [0 0 1 4]
    fn tridiagonal(scale: f64) -> CompressedRowSparseMatrix {
        let mut triplets = Vec::new();
        for i in 0..4 {
            triplets.push((i, i, 4.0 * scale));
            if i > 0 {
                triplets.push((i, i - 1, scale));
            }
        }
        CompressedRowSparseMatrix::from_triplets(4, 4, &triplets, StorageType::LowerTriangular)
            .unwrap()
    }

    fn rhs_for(lhs: &CompressedRowSparseMatrix, x: &[f64]) -> Vec<f64> {
        let mut rhs = vec![0.0; x.len()];
        lhs.right_multiply_and_accumulate(x, &mut rhs);
        rhs
    }

    #[test]
    fn test_solve_double_precision() {
        for ordering in [OrderingType::Natural, OrderingType::Amd] {
            let lhs = tridiagonal(1.0);
            let x_true = [1.0, -2.0, 3.0, 0.5];
            let rhs = rhs_for(&lhs, &x_true);

            let mut cholesky = FaerCholesky::<f64>::new(ordering);
            cholesky.factorize(&lhs).unwrap();
            assert!(cholesky.is_factorized());
            assert!(cholesky.factor_nonzeros().is_some());

            let mut x = vec![0.0; 4];
            cholesky.solve(&rhs, &mut x).unwrap();
            for i in 0..4 {
                assert!((x[i] - x_true[i]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_solve_single_precision() {
        let lhs = tridiagonal(1.0);
        let x_true = [1.0, -2.0, 3.0, 0.5];
        let rhs = rhs_for(&lhs, &x_true);

        let mut cholesky = FaerCholesky::<f32>::new(OrderingType::Amd);
        cholesky.factorize(&lhs).unwrap();
        let mut x = vec![0.0; 4];
        cholesky.solve(&rhs, &mut x).unwrap();
        for i in 0..4 {
            assert!((x[i] - x_true[i]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_symbolic_reuse_across_values() {
        let mut cholesky = FaerCholesky::<f64>::new(OrderingType::Amd);
        for scale in [1.0, 3.0] {
            let lhs = tridiagonal(scale);
            let x_true = [0.25, 1.0, -1.0, 2.0];
            let rhs = rhs_for(&lhs, &x_true);
            cholesky.factorize(&lhs).unwrap();
            let mut x = vec![0.0; 4];
            cholesky.solve(&rhs, &mut x).unwrap();
            for i in 0..4 {
                assert!((x[i] - x_true[i]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_indefinite_matrix_fails_and_drops_factorization() {
        let mut cholesky = FaerCholesky::<f64>::new(OrderingType::Natural);
        cholesky.factorize(&tridiagonal(1.0)).unwrap();

        let lhs = tridiagonal(-1.0);
        let err = cholesky.factorize(&lhs).unwrap_err();
        assert!(matches!(err, LinearSolverError::Failure(_)));
        assert!(!cholesky.is_factorized());

        let mut x = vec![0.0; 4];
        assert!(matches!(
            cholesky.solve(&[1.0; 4], &mut x),
            Err(LinearSolverError::Fatal(_))
        ));
    }

    #[test]
    fn test_solve_before_factorize_is_rejected() {
        let mut cholesky = FaerCholesky::<f64>::new(OrderingType::Amd);
        let mut x = vec![0.0; 4];
        assert!(matches!(
            cholesky.solve(&[1.0; 4], &mut x),
            Err(LinearSolverError::Fatal(_))
        ));
    }

    #[test]
    fn test_changed_pattern_is_fatal() {
        let mut cholesky = FaerCholesky::<f64>::new(OrderingType::Amd);
        cholesky.factorize(&tridiagonal(1.0)).unwrap();
        let diagonal = CompressedRowSparseMatrix::from_triplets(
            4,
            4,
            &[(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0), (3, 3, 1.0)],
            StorageType::LowerTriangular,
        )
        .unwrap();
        assert!(matches!(
            cholesky.factorize(&diagonal),
            Err(LinearSolverError::Fatal(_))
        ));
    }
}
