use std::error::Error;
use std::time::Instant;

use apex_cholesky::linalg::{LinearSolverOptions, OrderingType, PerSolveOptions};
use apex_cholesky::{
    BlockSparseMatrix, SparseLinearAlgebraLibraryType, SparseNormalCholeskySolver, init_logger,
};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "solve_normal_equations")]
#[command(about = "Solve the normal equations of a random block-sparse Jacobian")]
struct Args {
    /// Number of column blocks (parameter blocks)
    #[arg(short = 'c', long, default_value = "200")]
    num_col_blocks: usize,

    /// Number of random row blocks (residual blocks) on top of one anchor per column block
    #[arg(short = 'r', long, default_value = "1000")]
    num_row_blocks: usize,

    /// Largest block size, rows and columns
    #[arg(long, default_value = "6")]
    max_block_size: usize,

    /// Probability that a row block touches a given column block
    #[arg(short, long, default_value = "0.02")]
    density: f64,

    /// Diagonal damping value applied to every column, 0 disables damping
    #[arg(long, default_value = "0.0")]
    damping: f64,

    /// Backend: "faer", "sprs-ldl" or "nalgebra-sparse"
    #[arg(short, long, default_value = "faer")]
    backend: String,

    /// Fill-reducing ordering: "amd", "natural", "rcm" or "nested-dissection"
    #[arg(short, long, default_value = "amd")]
    ordering: String,

    /// Factorize in single precision
    #[arg(long)]
    mixed_precision: bool,

    /// Number of iterative refinement steps after each solve
    #[arg(long, default_value = "0")]
    refinement_iterations: usize,

    /// Number of solves with fresh values on the same structure
    #[arg(long, default_value = "3")]
    num_solves: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn parse_backend(name: &str) -> Result<SparseLinearAlgebraLibraryType, Box<dyn Error>> {
    match name.to_lowercase().as_str() {
        "faer" => Ok(SparseLinearAlgebraLibraryType::Faer),
        "sprs-ldl" | "sprs" => Ok(SparseLinearAlgebraLibraryType::SprsLdl),
        "nalgebra-sparse" | "nalgebra" => Ok(SparseLinearAlgebraLibraryType::NalgebraSparse),
        _ => Err(format!(
            "Unknown backend: {}. Valid options: faer, sprs-ldl, nalgebra-sparse",
            name
        )
        .into()),
    }
}

fn parse_ordering(name: &str) -> Result<OrderingType, Box<dyn Error>> {
    match name.to_lowercase().as_str() {
        "amd" => Ok(OrderingType::Amd),
        "natural" => Ok(OrderingType::Natural),
        "nested-dissection" | "nd" => Ok(OrderingType::NestedDissection),
        "rcm" | "reverse-cuthill-mckee" => Ok(OrderingType::ReverseCuthillMcKee),
        _ => Err(format!(
            "Unknown ordering: {}. Valid options: amd, natural, nested-dissection, rcm",
            name
        )
        .into()),
    }
}

/// Rejects arguments the generator cannot honor.
fn validate_args(args: &Args) -> Result<(), Box<dyn Error>> {
    if args.num_col_blocks == 0 {
        return Err("num-col-blocks must be positive".into());
    }
    if args.max_block_size == 0 {
        return Err("max-block-size must be positive".into());
    }
    if !(0.0..=1.0).contains(&args.density) {
        return Err(format!("density must be in [0, 1], got {}", args.density).into());
    }
    if !args.damping.is_finite() || args.damping < 0.0 {
        return Err(format!("damping must be non-negative, got {}", args.damping).into());
    }
    Ok(())
}

/// Random Jacobian with one anchor row block per column block, which keeps
/// `AᵀA` positive definite, plus `args.num_row_blocks` random row blocks.
fn random_jacobian(args: &Args, rng: &mut StdRng) -> Result<BlockSparseMatrix, Box<dyn Error>> {
    let max_size = args.max_block_size;
    let col_sizes: Vec<usize> = (0..args.num_col_blocks)
        .map(|_| rng.random_range(1..=max_size))
        .collect();

    let mut row_blocks: Vec<(usize, Vec<usize>)> = col_sizes
        .iter()
        .enumerate()
        .map(|(j, &size)| (size, vec![j]))
        .collect();
    let density = args.density;
    for _ in 0..args.num_row_blocks {
        let mut cols: Vec<usize> = (0..args.num_col_blocks)
            .filter(|_| rng.random_bool(density))
            .collect();
        if cols.is_empty() {
            cols.push(rng.random_range(0..args.num_col_blocks));
        }
        row_blocks.push((rng.random_range(1..=max_size), cols));
    }

    let mut a = BlockSparseMatrix::from_block_pattern(&col_sizes, &row_blocks)?;
    fill_values(&mut a, rng);
    Ok(a)
}

fn fill_values(a: &mut BlockSparseMatrix, rng: &mut StdRng) {
    let bs = a.block_structure().clone();
    let values = a.mut_values();
    for v in values.iter_mut() {
        *v = rng.random_range(-1.0..=1.0);
    }
    for row in bs.rows.iter().take(bs.cols.len()) {
        let size = row.block.size;
        for k in 0..size {
            values[row.cells[0].position + k * size + k] += size as f64 + 1.0;
        }
    }
}

/// ‖AᵀA·x + DᵀD·x - Aᵀb‖∞ relative to ‖Aᵀb‖∞
fn relative_residual(a: &BlockSparseMatrix, b: &[f64], d: Option<&[f64]>, x: &[f64]) -> f64 {
    let mut ax = vec![0.0; a.num_rows()];
    a.right_multiply_and_accumulate(x, &mut ax);
    for (axi, bi) in ax.iter_mut().zip(b) {
        *axi -= bi;
    }
    let mut residual = vec![0.0; a.num_cols()];
    a.left_multiply_and_accumulate(&ax, &mut residual);
    if let Some(d) = d {
        for ((r, di), xi) in residual.iter_mut().zip(d).zip(x) {
            *r += di * di * xi;
        }
    }

    let mut gradient = vec![0.0; a.num_cols()];
    a.left_multiply_and_accumulate(b, &mut gradient);
    let inf_norm = |v: &[f64]| v.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    inf_norm(&residual) / inf_norm(&gradient).max(f64::MIN_POSITIVE)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    validate_args(&args)?;

    init_logger();

    info!("APEX-CHOLESKY NORMAL EQUATIONS");
    info!("");

    let options = LinearSolverOptions::new()
        .with_library(parse_backend(&args.backend)?)
        .with_ordering(parse_ordering(&args.ordering)?)
        .with_mixed_precision(args.mixed_precision)
        .with_refinement_iterations(args.refinement_iterations);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut a = random_jacobian(&args, &mut rng)?;

    info!("Problem statistics:");
    info!("  Column blocks: {}", a.num_col_blocks());
    info!("  Row blocks: {}", a.num_row_blocks());
    info!("  Jacobian size: {} x {}", a.num_rows(), a.num_cols());
    info!("  Jacobian non-zeros: {}", a.num_nonzeros());
    info!("Solver configuration:");
    info!("  Backend: {}", options.sparse_linear_algebra_library_type);
    info!("  Ordering: {:?}", options.ordering_type);
    info!("  Mixed precision: {}", options.use_mixed_precision_solves);
    info!(
        "  Refinement iterations: {}",
        options.max_num_refinement_iterations
    );
    info!("");

    let mut solver = SparseNormalCholeskySolver::new(options)?;
    let damping = (args.damping > 0.0).then(|| vec![args.damping; a.num_cols()]);
    let per_solve = match damping.as_deref() {
        Some(d) => PerSolveOptions::with_damping(d),
        None => PerSolveOptions::default(),
    };

    let mut x = vec![0.0; a.num_cols()];
    let mut failures = 0;
    for solve in 0..args.num_solves.max(1) {
        if solve > 0 {
            fill_values(&mut a, &mut rng);
        }
        let b: Vec<f64> = (0..a.num_rows())
            .map(|_| rng.random_range(-1.0..=1.0))
            .collect();

        let start = Instant::now();
        let summary = solver.solve(&mut a, &b, &per_solve, &mut x);
        let elapsed = start.elapsed();

        if summary.is_success() {
            let residual = relative_residual(&a, &b, per_solve.d, &x);
            info!(
                "Solve {}: {} in {:.2}ms, relative residual {:.3e}",
                solve,
                summary.termination_type,
                elapsed.as_secs_f64() * 1000.0,
                residual
            );
        } else {
            failures += 1;
            warn!(
                "Solve {}: {} ({})",
                solve, summary.termination_type, summary.message
            );
        }
    }

    println!("\n{}", solver.execution_summary());

    if let Some(builder) = solver.inner_product() {
        println!(
            "Inner product: {} x {} with {} non-zeros from {} product terms",
            builder.matrix().num_rows(),
            builder.matrix().num_cols(),
            builder.matrix().num_nonzeros(),
            builder.num_product_terms()
        );
    }

    if failures > 0 {
        return Err(format!("{} of {} solves failed", failures, args.num_solves.max(1)).into());
    }
    Ok(())
}
