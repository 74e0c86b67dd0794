//! Sparse normal-equations solver.
//!
//! Solves `(AᵀA + DᵀD)·x = Aᵀb` for a block-sparse Jacobian `A` and an
//! optional Levenberg-Marquardt diagonal `D`:
//!
//! 1. `g = Aᵀb`
//! 2. if `D` is given, append it to `A` as extra row blocks
//! 3. build the inner product structure once, refresh its values every call
//! 4. remove the damping rows again
//! 5. factorize the product and solve for `x`
//!
//! Failures of the factorization are reported unchanged in the returned
//! [`LinearSolverSummary`]; deciding whether to retry with more damping is
//! up to the caller.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{
    InnerProductBuilder, LinearSolverError, LinearSolverOptions, LinearSolverResult,
    LinearSolverSummary, RefinedSparseCholesky, SparseCholesky, SparseIterativeRefiner,
    create_sparse_cholesky,
};
use crate::matrix::{BlockSparseMatrix, CompressedRowBlockStructure};

/// Options that may change from one solve to the next.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerSolveOptions<'a> {
    /// Diagonal damping `D`; `DᵀD` is added to `AᵀA` for this solve only
    pub d: Option<&'a [f64]>,
}

impl<'a> PerSolveOptions<'a> {
    pub fn with_damping(d: &'a [f64]) -> Self {
        Self { d: Some(d) }
    }
}

/// Accumulated timings of a [`SparseNormalCholeskySolver`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    /// Number of calls to `solve`
    pub num_solves: usize,
    /// Number of times the inner product structure was (re)built
    pub num_inner_product_builds: usize,
    /// Time spent building and computing `AᵀA`, damping included
    pub inner_product_time: Duration,
    /// Time spent in factorization and triangular solves
    pub factor_and_solve_time: Duration,
    /// Total time spent in `solve`
    pub total_time: Duration,
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Sparse Normal Cholesky Summary ===")?;
        writeln!(f, "Solves:                    {}", self.num_solves)?;
        writeln!(
            f,
            "Inner product builds:      {}",
            self.num_inner_product_builds
        )?;
        writeln!(f, "Inner product time:        {:?}", self.inner_product_time)?;
        writeln!(
            f,
            "Factor and solve time:     {:?}",
            self.factor_and_solve_time
        )?;
        writeln!(f, "Total time:                {:?}", self.total_time)?;
        Ok(())
    }
}

pub struct SparseNormalCholeskySolver {
    /// Present when the backend was created from options and can be recreated
    options: Option<LinearSolverOptions>,
    sparse_cholesky: Box<dyn SparseCholesky>,
    inner_product: Option<InnerProductBuilder>,
    /// Block structure of `A` (damping included) the inner product was built for
    built_structure: Option<CompressedRowBlockStructure>,
    rhs: Vec<f64>,
    execution_summary: ExecutionSummary,
}

impl SparseNormalCholeskySolver {
    /// Creates a solver whose backend is selected by `options`.
    ///
    /// When `max_num_refinement_iterations > 0` the backend is wrapped in a
    /// [`RefinedSparseCholesky`].
    pub fn new(options: LinearSolverOptions) -> LinearSolverResult<Self> {
        let sparse_cholesky = Self::create_backend(&options)?;
        Ok(Self {
            options: Some(options),
            ..Self::with_sparse_cholesky(sparse_cholesky)
        })
    }

    /// Creates a solver around an existing backend.
    ///
    /// The backend cannot be recreated, so a later change of the Jacobian
    /// structure surfaces as the backend's pattern-change error.
    pub fn with_sparse_cholesky(sparse_cholesky: Box<dyn SparseCholesky>) -> Self {
        Self {
            options: None,
            sparse_cholesky,
            inner_product: None,
            built_structure: None,
            rhs: Vec::new(),
            execution_summary: ExecutionSummary::default(),
        }
    }

    fn create_backend(options: &LinearSolverOptions) -> LinearSolverResult<Box<dyn SparseCholesky>> {
        let sparse_cholesky = create_sparse_cholesky(options)?;
        if options.max_num_refinement_iterations == 0 {
            return Ok(sparse_cholesky);
        }
        Ok(Box::new(RefinedSparseCholesky::new(
            sparse_cholesky,
            Box::new(SparseIterativeRefiner::new(
                options.max_num_refinement_iterations,
            )),
        )))
    }

    pub fn options(&self) -> Option<&LinearSolverOptions> {
        self.options.as_ref()
    }

    pub fn execution_summary(&self) -> &ExecutionSummary {
        &self.execution_summary
    }

    /// The most recently computed `AᵀA + DᵀD`, if any.
    pub fn inner_product(&self) -> Option<&InnerProductBuilder> {
        self.inner_product.as_ref()
    }

    /// Solves the (damped) normal equations of `a` for `x`.
    ///
    /// `a` is borrowed mutably because the damping rows are appended to it
    /// for the duration of the inner product; on return it has its original
    /// row blocks again.
    pub fn solve(
        &mut self,
        a: &mut BlockSparseMatrix,
        b: &[f64],
        per_solve_options: &PerSolveOptions<'_>,
        x: &mut [f64],
    ) -> LinearSolverSummary {
        let start = Instant::now();
        self.execution_summary.num_solves += 1;

        if b.len() != a.num_rows() || x.len() != a.num_cols() {
            return LinearSolverSummary::fatal(format!(
                "b has length {} and x has length {} for a {}x{} Jacobian",
                b.len(),
                x.len(),
                a.num_rows(),
                a.num_cols()
            ));
        }

        self.rhs.clear();
        self.rhs.resize(a.num_cols(), 0.0);
        a.left_multiply_and_accumulate(b, &mut self.rhs);

        let product_start = Instant::now();
        let num_damping_row_blocks = match per_solve_options.d {
            Some(d) => {
                let damping = match BlockSparseMatrix::create_diagonal_matrix(
                    d,
                    &a.block_structure().cols,
                )
                .and_then(|damping| a.append_rows(&damping).map(|()| damping))
                {
                    Ok(damping) => damping,
                    Err(err) => {
                        return LinearSolverSummary::fatal(format!("invalid damping: {err}"));
                    }
                };
                damping.num_row_blocks()
            }
            None => 0,
        };

        let product = self.compute_inner_product(a);
        if num_damping_row_blocks > 0 {
            a.delete_row_blocks(num_damping_row_blocks);
        }
        let inner_product_time = product_start.elapsed();
        self.execution_summary.inner_product_time += inner_product_time;
        if let Err(err) = product {
            self.execution_summary.total_time += start.elapsed();
            return LinearSolverSummary::from_error(&err);
        }

        let solve_start = Instant::now();
        let summary = match self.inner_product.as_ref() {
            Some(builder) => self
                .sparse_cholesky
                .factor_and_solve(builder.matrix(), &self.rhs, x),
            None => LinearSolverSummary::fatal("inner product was not computed"),
        };
        let factor_and_solve_time = solve_start.elapsed();
        self.execution_summary.factor_and_solve_time += factor_and_solve_time;
        self.execution_summary.total_time += start.elapsed();

        debug!(
            "{} normal equations: {} in {:?} (inner product {:?}, factor and solve {:?})",
            self.sparse_cholesky.name(),
            summary.termination_type,
            start.elapsed(),
            inner_product_time,
            factor_and_solve_time
        );
        summary
    }

    fn compute_inner_product(&mut self, a: &BlockSparseMatrix) -> LinearSolverResult<()> {
        let structure = a.block_structure();
        if self.built_structure.as_ref() != Some(structure) {
            if self.built_structure.is_some() {
                debug!(
                    "Jacobian structure changed to {} row blocks and {} nonzeros, rebuilding the inner product",
                    a.num_row_blocks(),
                    a.num_nonzeros()
                );
                if let Some(options) = self.options.as_ref() {
                    self.sparse_cholesky = Self::create_backend(options)?;
                }
            }

            let builder = InnerProductBuilder::new(a, self.sparse_cholesky.storage_type())
                .map_err(|err| LinearSolverError::Fatal(err.to_string()))?;
            self.inner_product = Some(builder);
            self.built_structure = Some(structure.clone());
            self.execution_summary.num_inner_product_builds += 1;
        }

        match self.inner_product.as_mut() {
            Some(builder) => {
                builder.compute(a);
                Ok(())
            }
            None => Err(LinearSolverError::Fatal(
                "inner product was not built".into(),
            )),
        }
    }
}
