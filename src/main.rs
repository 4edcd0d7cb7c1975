//! Block Reduce - Sum a large integer array on the GPU, block by block
//!
//! Runs both neighbored-pair reducers (global memory in place, then
//! shared-memory scratch) over 2^24 pseudo-random integers and compares each
//! result with a sequential host sum.
//!
//! ```bash
//! block-reduce          # blocks of 1024 units
//! block-reduce 256      # blocks of 256 units
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use block_reduce::fill::random_input;
use block_reduce::{
    HostGrid, Orchestrator, ReductionTarget, RunConfig, RunReport, Variant, WgpuTarget,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetKind {
    /// The default wgpu adapter
    Wgpu,
    /// Host-side model of the grid
    Host,
}

/// Parallel block reduction benchmark
#[derive(Parser, Debug)]
#[command(name = "block-reduce")]
#[command(version)]
struct Args {
    /// Units per block for both reduction variants
    #[arg(default_value_t = block_reduce::partition::DEFAULT_BLOCK_WIDTH)]
    block_width: u32,

    /// Execution target
    #[arg(long, env = "BLOCK_REDUCE_TARGET", value_enum, default_value_t = TargetKind::Wgpu)]
    target: TargetKind,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run<T: ReductionTarget>(target: T, config: &RunConfig) -> Result<RunReport> {
    let input = random_input(config.len, config.seed);
    let mut orchestrator = Orchestrator::new(target, config.block_width);
    orchestrator
        .run(&input, &Variant::ALL)
        .with_context(|| format!("reduction with block width {} failed", config.block_width))
}

fn print_report(report: &RunReport) {
    let shape = &report.shape;
    println!(
        "\twith array size {}  grid {} block {}",
        shape.num_elements(),
        shape.grid_width(),
        shape.block_width()
    );
    println!(
        "cpu reduce                 elapsed {:.6} ms cpu_sum: {}",
        report.reference_elapsed.as_secs_f64() * 1e3,
        report.reference_sum
    );
    for pass in &report.passes {
        println!(
            "gpu {:<26} elapsed {:.6} ms gpu_sum: {}<<<grid {} block {}>>>",
            pass.variant.to_string(),
            pass.elapsed.as_secs_f64() * 1e3,
            pass.device_sum,
            shape.grid_width(),
            shape.block_width()
        );
    }
    if report.succeeded() {
        println!("Test success!");
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = RunConfig::default().with_block_width(args.block_width);
    config.validate()?;

    let report = match args.target {
        TargetKind::Wgpu => run(WgpuTarget::new(), &config)?,
        TargetKind::Host => run(HostGrid::new(), &config)?,
    };
    print_report(&report);
    Ok(())
}
