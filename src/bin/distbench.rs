use clap::Parser;
use distbench::harness::{run_suite, BenchContext, CaseReport};
use distbench::{BenchOptions, DistError, GridPolicy, ThreadUniverse};

/// Distributed dense and stencil kernel benchmarks with validation
#[derive(Parser)]
#[command(name = "distbench", version)]
struct Cli {
    /// Kernel to run (repeatable); all kernels when omitted
    #[arg(long = "kernel", short = 'k')]
    kernels: Vec<String>,

    /// Problem sizes for every selected kernel, e.g. `--size 10,2800`
    #[arg(long, value_delimiter = ',')]
    size: Option<Vec<usize>>,

    /// Timed calls per case
    #[arg(long, default_value_t = 10)]
    repetitions: usize,

    /// Skip gathering and checking against the reference
    #[arg(long)]
    no_validate: bool,

    /// Process grid policy: `table` or `square`
    #[arg(long, default_value = "table")]
    grid_policy: GridPolicy,

    /// Number of ranks for the in-process thread backend
    #[arg(long, default_value_t = 4)]
    ranks: usize,

    /// Reporting rank
    #[arg(long, default_value_t = 0)]
    root: usize,

    /// Run one rank per MPI process instead of threads
    #[arg(long)]
    mpi: bool,
}

impl Cli {
    fn options(&self) -> BenchOptions {
        BenchOptions {
            repetitions: self.repetitions,
            validate: !self.no_validate,
            grid_policy: self.grid_policy,
            root: self.root,
            kernels: self.kernels.clone(),
            sizes: self.size.clone(),
        }
    }
}

fn print_reports(reports: &[CaseReport]) -> bool {
    for r in reports {
        println!("{r}");
    }
    reports.iter().all(CaseReport::passed)
}

fn run_threads(cli: &Cli) -> Result<Vec<CaseReport>, DistError> {
    if cli.ranks == 0 {
        return Err(DistError::UnsupportedProcessCount { count: 0 });
    }
    let options = cli.options();
    let mut results = ThreadUniverse::run(cli.ranks, |comm| {
        let ctx = BenchContext::new(comm, options.clone())?;
        run_suite(&ctx)
    });
    // every rank fails the same way; report the first error
    if let Some(pos) = results.iter().position(Result::is_err) {
        return results.swap_remove(pos);
    }
    if cli.root >= results.len() {
        return Err(DistError::RankOutOfRange { rank: cli.root, size: results.len() });
    }
    results.swap_remove(cli.root)
}

#[cfg(feature = "mpi")]
fn run_mpi(cli: &Cli) -> Result<Vec<CaseReport>, DistError> {
    let comm = distbench::parallel::MpiComm::new()?;
    let ctx = BenchContext::new(&comm, cli.options())?;
    run_suite(&ctx)
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_cli: &Cli) -> Result<Vec<CaseReport>, DistError> {
    Err(DistError::Communication("built without the `mpi` feature".into()))
}

fn main() {
    let cli = Cli::parse();
    env_logger::init();

    let outcome = if cli.mpi { run_mpi(&cli) } else { run_threads(&cli) };
    let reports = outcome.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    if !print_reports(&reports) {
        std::process::exit(2);
    }
}
