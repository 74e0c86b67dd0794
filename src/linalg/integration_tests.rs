#[cfg(test)]
mod integration_tests {
    use nalgebra::{DMatrix, DVector};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::linalg::{
        InnerProductBuilder, LinearSolverOptions, OrderingType, PerSolveOptions,
        SparseLinearAlgebraLibraryType, SparseNormalCholeskySolver, create_sparse_cholesky,
    };
    use crate::matrix::BlockSparseMatrix;

    /// Random Jacobian with one well-conditioned anchor row block per column
    /// block plus `num_random_rows` row blocks touching up to three column blocks.
    fn random_jacobian(seed: u64, num_col_blocks: usize, num_random_rows: usize) -> BlockSparseMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let col_sizes: Vec<usize> = (0..num_col_blocks)
            .map(|_| rng.random_range(1..=3))
            .collect();

        let mut row_blocks: Vec<(usize, Vec<usize>)> = col_sizes
            .iter()
            .enumerate()
            .map(|(j, &size)| (size, vec![j]))
            .collect();
        for _ in 0..num_random_rows {
            let mut cols: Vec<usize> = (0..rng.random_range(1..=3))
                .map(|_| rng.random_range(0..num_col_blocks))
                .collect();
            cols.sort_unstable();
            cols.dedup();
            row_blocks.push((rng.random_range(1..=3), cols));
        }

        let mut a = BlockSparseMatrix::from_block_pattern(&col_sizes, &row_blocks).unwrap();
        randomize_values(&mut a, &mut rng);
        a
    }

    /// Fills `a` with values in [-1, 1], adding 3·I to the anchor blocks.
    fn randomize_values(a: &mut BlockSparseMatrix, rng: &mut StdRng) {
        let bs = a.block_structure().clone();
        let values = a.mut_values();
        for v in values.iter_mut() {
            *v = rng.random_range(-1.0..=1.0);
        }
        for row in bs.rows.iter().take(bs.cols.len()) {
            let size = row.block.size;
            for k in 0..size {
                values[row.cells[0].position + k * size + k] += 3.0;
            }
        }
    }

    fn random_vector(rng: &mut StdRng, n: usize) -> Vec<f64> {
        (0..n).map(|_| rng.random_range(-2.0..=2.0)).collect()
    }

    fn max_error(x: &[f64], expected: &[f64]) -> f64 {
        x.iter()
            .zip(expected)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    fn all_options() -> Vec<(LinearSolverOptions, f64)> {
        use SparseLinearAlgebraLibraryType::*;
        vec![
            (LinearSolverOptions::new().with_library(Faer), 1e-8),
            (
                LinearSolverOptions::new()
                    .with_library(Faer)
                    .with_ordering(OrderingType::Natural),
                1e-8,
            ),
            (
                LinearSolverOptions::new()
                    .with_library(Faer)
                    .with_mixed_precision(true),
                1e-3,
            ),
            (
                LinearSolverOptions::new()
                    .with_library(SprsLdl)
                    .with_ordering(OrderingType::Natural),
                1e-8,
            ),
            (
                LinearSolverOptions::new()
                    .with_library(SprsLdl)
                    .with_ordering(OrderingType::ReverseCuthillMcKee),
                1e-8,
            ),
            (
                LinearSolverOptions::new()
                    .with_library(NalgebraSparse)
                    .with_ordering(OrderingType::Natural),
                1e-8,
            ),
            (
                LinearSolverOptions::new()
                    .with_library(NalgebraSparse)
                    .with_ordering(OrderingType::Natural)
                    .with_mixed_precision(true),
                1e-3,
            ),
        ]
    }

    #[test]
    fn test_inner_product_round_trip_on_every_backend() {
        let a = random_jacobian(7, 8, 20);
        let mut rng = StdRng::seed_from_u64(11);
        let x_true = random_vector(&mut rng, a.num_cols());

        for (options, tolerance) in all_options() {
            let mut cholesky = create_sparse_cholesky(&options).unwrap();
            let mut builder = InnerProductBuilder::new(&a, cholesky.storage_type()).unwrap();
            builder.compute(&a);

            let mut rhs = vec![0.0; a.num_cols()];
            builder.matrix().right_multiply_and_accumulate(&x_true, &mut rhs);

            let mut x = vec![0.0; a.num_cols()];
            let summary = cholesky.factor_and_solve(builder.matrix(), &rhs, &mut x);
            assert!(summary.is_success(), "{}: {}", cholesky.name(), summary.message);
            let error = max_error(&x, &x_true);
            assert!(error < tolerance, "{}: error {error:e}", cholesky.name());
        }
    }

    #[test]
    fn test_symbolic_factorization_is_reused_across_values() {
        let mut a = random_jacobian(21, 6, 12);
        let mut rng = StdRng::seed_from_u64(5);

        for (options, tolerance) in all_options() {
            let mut cholesky = create_sparse_cholesky(&options).unwrap();
            let mut builder = InnerProductBuilder::new(&a, cholesky.storage_type()).unwrap();

            for _ in 0..2 {
                randomize_values(&mut a, &mut rng);
                builder.compute(&a);
                let x_true = random_vector(&mut rng, a.num_cols());
                let mut rhs = vec![0.0; a.num_cols()];
                builder.matrix().right_multiply_and_accumulate(&x_true, &mut rhs);

                let mut x = vec![0.0; a.num_cols()];
                let summary = cholesky.factor_and_solve(builder.matrix(), &rhs, &mut x);
                assert!(summary.is_success(), "{}: {}", cholesky.name(), summary.message);
                assert!(max_error(&x, &x_true) < tolerance, "{}", cholesky.name());
            }
        }
    }

    #[test]
    fn test_damped_normal_equations_match_dense_solution() {
        let mut a = random_jacobian(3, 7, 15);
        let mut rng = StdRng::seed_from_u64(13);
        let b = random_vector(&mut rng, a.num_rows());
        let d: Vec<f64> = (0..a.num_cols()).map(|_| rng.random_range(0.1..1.0)).collect();

        let dense = a.to_dense();
        let damping = DMatrix::from_diagonal(&DVector::from_vec(d.iter().map(|v| v * v).collect()));
        let lhs = dense.transpose() * &dense + damping;
        let rhs = dense.transpose() * DVector::from_column_slice(&b);
        let expected = lhs.cholesky().unwrap().solve(&rhs);

        for (options, tolerance) in all_options() {
            let mut solver = SparseNormalCholeskySolver::new(options).unwrap();
            let mut x = vec![0.0; a.num_cols()];
            let summary = solver.solve(&mut a, &b, &PerSolveOptions::with_damping(&d), &mut x);
            assert!(summary.is_success(), "{}", summary.message);
            assert!(max_error(&x, expected.as_slice()) < tolerance);
        }
    }

    #[test]
    fn test_refinement_recovers_double_precision_accuracy() {
        let mut a = random_jacobian(17, 10, 30);
        let mut rng = StdRng::seed_from_u64(23);
        let b = random_vector(&mut rng, a.num_rows());

        let mut reference = SparseNormalCholeskySolver::new(LinearSolverOptions::default()).unwrap();
        let mut expected = vec![0.0; a.num_cols()];
        assert!(
            reference
                .solve(&mut a, &b, &PerSolveOptions::default(), &mut expected)
                .is_success()
        );

        let mixed = LinearSolverOptions::new().with_mixed_precision(true);
        let mut unrefined_solver = SparseNormalCholeskySolver::new(mixed.clone()).unwrap();
        let mut unrefined = vec![0.0; a.num_cols()];
        assert!(
            unrefined_solver
                .solve(&mut a, &b, &PerSolveOptions::default(), &mut unrefined)
                .is_success()
        );

        let mut refined_solver =
            SparseNormalCholeskySolver::new(mixed.with_refinement_iterations(4)).unwrap();
        let mut refined = vec![0.0; a.num_cols()];
        assert!(
            refined_solver
                .solve(&mut a, &b, &PerSolveOptions::default(), &mut refined)
                .is_success()
        );

        let unrefined_error = max_error(&unrefined, &expected);
        let refined_error = max_error(&refined, &expected);
        assert!(
            refined_error <= unrefined_error,
            "refined {refined_error:e}, unrefined {unrefined_error:e}"
        );
        assert!(refined_error < 1e-9, "refined {refined_error:e}");
    }
}
