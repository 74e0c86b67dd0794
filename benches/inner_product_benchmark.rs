//! Inner product and factorization benchmarks
//!
//! Measures the two phases of a normal-equations solve on random
//! bundle-adjustment-like Jacobians (few wide column blocks, many short
//! row blocks):
//!
//! - `InnerProductBuilder::new`: pattern of `AᵀA` from the block structure
//! - `InnerProductBuilder::compute`: value refresh on a fixed pattern
//! - `SparseCholesky::factor_and_solve` for every backend
//!
//! ## Usage
//!
//! ```bash
//! cargo bench --bench inner_product_benchmark
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use apex_cholesky::linalg::{LinearSolverOptions, OrderingType};
use apex_cholesky::{
    BlockSparseMatrix, InnerProductBuilder, SparseLinearAlgebraLibraryType, StorageType,
    create_sparse_cholesky,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SIZES: [usize; 3] = [50, 200, 800];

fn random_jacobian(num_col_blocks: usize, seed: u64) -> BlockSparseMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let col_sizes: Vec<usize> = (0..num_col_blocks)
        .map(|_| if rng.random_bool(0.3) { 6 } else { 3 })
        .collect();

    let mut row_blocks: Vec<(usize, Vec<usize>)> = col_sizes
        .iter()
        .enumerate()
        .map(|(j, &size)| (size, vec![j]))
        .collect();
    for _ in 0..num_col_blocks * 4 {
        let first = rng.random_range(0..num_col_blocks);
        let second = rng.random_range(0..num_col_blocks);
        let mut cols = vec![first, second];
        cols.sort_unstable();
        cols.dedup();
        row_blocks.push((2, cols));
    }

    let mut a = match BlockSparseMatrix::from_block_pattern(&col_sizes, &row_blocks) {
        Ok(a) => a,
        Err(e) => panic!("invalid benchmark pattern: {e}"),
    };
    let bs = a.block_structure().clone();
    let values = a.mut_values();
    for v in values.iter_mut() {
        *v = rng.random_range(-1.0..=1.0);
    }
    for row in bs.rows.iter().take(bs.cols.len()) {
        let size = row.block.size;
        for k in 0..size {
            values[row.cells[0].position + k * size + k] += 4.0;
        }
    }
    a
}

fn bench_inner_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("inner_product");

    for &num_col_blocks in &SIZES {
        let a = random_jacobian(num_col_blocks, 7);
        group.throughput(Throughput::Elements(a.num_nonzeros() as u64));

        group.bench_with_input(BenchmarkId::new("build", num_col_blocks), &a, |b, a| {
            b.iter(|| black_box(InnerProductBuilder::new(a, StorageType::LowerTriangular)))
        });

        let Ok(mut builder) = InnerProductBuilder::new(&a, StorageType::LowerTriangular) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::new("compute", num_col_blocks), &a, |b, a| {
            b.iter(|| {
                builder.compute(black_box(a));
                black_box(builder.matrix().values()[0])
            })
        });
    }

    group.finish();
}

fn bench_factor_and_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("factor_and_solve");
    group.sample_size(20);

    let backends = [
        ("faer-amd", SparseLinearAlgebraLibraryType::Faer, OrderingType::Amd, false),
        ("faer-amd-f32", SparseLinearAlgebraLibraryType::Faer, OrderingType::Amd, true),
        ("sprs-ldl", SparseLinearAlgebraLibraryType::SprsLdl, OrderingType::Natural, false),
        (
            "nalgebra-sparse",
            SparseLinearAlgebraLibraryType::NalgebraSparse,
            OrderingType::Natural,
            false,
        ),
    ];

    for &num_col_blocks in &SIZES {
        let a = random_jacobian(num_col_blocks, 11);
        for &(name, library, ordering, mixed) in &backends {
            let options = LinearSolverOptions::new()
                .with_library(library)
                .with_ordering(ordering)
                .with_mixed_precision(mixed);
            let Ok(mut cholesky) = create_sparse_cholesky(&options) else {
                continue;
            };
            let Ok(mut builder) = InnerProductBuilder::new(&a, cholesky.storage_type()) else {
                continue;
            };
            builder.compute(&a);
            let rhs = vec![1.0; a.num_cols()];
            let mut x = vec![0.0; a.num_cols()];

            group.bench_function(BenchmarkId::new(name, num_col_blocks), |b| {
                b.iter(|| black_box(cholesky.factor_and_solve(builder.matrix(), &rhs, &mut x)))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_inner_product, bench_factor_and_solve);
criterion_main!(benches);
