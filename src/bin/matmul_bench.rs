//! matmul-bench: time distributed matrix multiply under each transfer mode.
//!
//! Runs either as an in-process group of threads (`--backend local`) or as
//! one rank of an MPI job (`--backend mpi`, launched through `mpirun`).

use std::io;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use matmul_modes::config::{BenchOptions, TransferMode, TransferModes};
use matmul_modes::context::BenchContext;
use matmul_modes::parallel::Comm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Local,
    Mpi,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Backend::Local),
            "mpi" => Ok(Backend::Mpi),
            other => Err(format!("unknown backend `{other}` (expected local or mpi)")),
        }
    }
}

/// Parallel matrix multiplication benchmark over synchronous, ready and
/// buffered row-block transfers.
#[derive(Parser, Debug)]
#[command(name = "matmul-bench")]
#[command(version)]
struct Cli {
    /// Process group backend (local, mpi)
    #[arg(long, default_value = "local", value_name = "BACKEND")]
    backend: Backend,

    /// Number of ranks for the local backend [default: number of CPUs]
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Matrix orders to run
    #[arg(long, value_delimiter = ',', default_values = ["192", "384", "768"])]
    orders: Vec<usize>,

    /// Transfer modes to run (sync, ready, buffered)
    #[arg(long, value_delimiter = ',', default_values = ["sync", "ready", "buffered"])]
    modes: Vec<TransferMode>,

    /// Largest operand entry; entries are drawn from 0..=MAX
    #[arg(long, default_value = "9", value_name = "MAX")]
    max_value: u32,

    /// RNG seed for reproducible operands
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Bytes to withhold from the buffered-mode staging buffer
    #[arg(long, default_value = "0", value_name = "BYTES")]
    staging_shortfall: usize,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

impl Cli {
    fn options(&self) -> BenchOptions {
        BenchOptions {
            matrix_orders: self.orders.clone(),
            modes: self.modes.iter().copied().collect::<TransferModes>(),
            max_value: self.max_value,
            seed: self.seed,
            staging_shortfall: self.staging_shortfall,
        }
    }
}

/// Setup logging on stderr so the report table owns stdout.
fn setup_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .init();
}

fn run_rank<C: Comm>(comm: &C, options: &BenchOptions) -> Result<()> {
    let context = BenchContext::<i32>::new(options.clone());
    let mut stdout = io::stdout();
    context
        .run(comm, &mut stdout)
        .with_context(|| format!("rank {} stopped", comm.rank()))?;
    Ok(())
}

#[cfg(feature = "rayon")]
fn run_local(cli: &Cli, options: &BenchOptions) -> Result<()> {
    use matmul_modes::parallel::RayonGroup;

    let group = match cli.workers {
        Some(n) => RayonGroup::new(n)?,
        None => RayonGroup::with_all_cpus(),
    };
    let results = group.run(|comm| run_rank(&comm, options))?;
    // every rank reports the same failure; surface the coordinator's
    results.into_iter().collect::<Result<Vec<()>>>()?;
    Ok(())
}

#[cfg(not(feature = "rayon"))]
fn run_local(_cli: &Cli, _options: &BenchOptions) -> Result<()> {
    anyhow::bail!("the local backend needs the `rayon` feature")
}

#[cfg(feature = "mpi")]
fn run_mpi(options: &BenchOptions) -> Result<()> {
    let comm = matmul_modes::parallel::MpiComm::new()?;
    run_rank(&comm, options)
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_options: &BenchOptions) -> Result<()> {
    anyhow::bail!("the mpi backend needs the `mpi` feature")
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);
    let options = cli.options();

    let outcome = match cli.backend {
        Backend::Local => run_local(&cli, &options),
        Backend::Mpi => run_mpi(&options),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
