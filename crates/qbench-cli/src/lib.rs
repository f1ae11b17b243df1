//! CLI for qbench
//!
//! Subcommands:
//! - `latency` / `throughput`: run a catalog pass and write the report
//! - `queries`: list the selected catalog entries
//! - `config`: show resolved configuration and where each value came from
//! - `compare`: per-query speedup between two reports

#![forbid(unsafe_code)]

pub mod output;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use qbench_core::{
    BenchMode, BenchmarkReport, ConfigLayer, ConfigSource, QueryCatalog, RunConfig,
};
use qbench_db::{SqliteProvider, run_latency_suite, run_throughput_suite};
use tracing_subscriber::EnvFilter;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitStatus {
    Success = 0,
    /// The run completed but nothing succeeded, or writing results failed.
    RuntimeError = 1,
    /// Invalid configuration, catalog or arguments.
    UsageError = 2,
}

impl ExitStatus {
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] qbench_core::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("all {0} queries failed")]
    AllQueriesFailed(usize),
}

impl CliError {
    #[must_use]
    pub const fn exit_status(&self) -> ExitStatus {
        match self {
            Self::Core(err) if err.is_configuration() => ExitStatus::UsageError,
            Self::InvalidArgument(_) => ExitStatus::UsageError,
            _ => ExitStatus::RuntimeError,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "qbench", version, about = "Query latency and throughput benchmarks")]
pub struct Cli {
    /// JSON5 config file (defaults to ./qbench.json5 when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sequential warmed-up runs with percentile statistics
    Latency(RunArgs),
    /// Fixed-duration concurrent load per query
    Throughput(RunArgs),
    /// List the selected catalog queries
    Queries(RunArgs),
    /// Show resolved configuration and sources
    Config(RunArgs),
    /// Per-query speedup of a candidate report over a baseline report
    Compare {
        /// Report without the optimization (e.g. `latency_no_index_small.json`)
        baseline: PathBuf,
        /// Report with the optimization (e.g. `latency_with_index_small.json`)
        candidate: PathBuf,
    },
}

/// Flags that override configuration for a run.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// SQLite database file (must already exist)
    #[arg(long = "database")]
    pub database: Option<PathBuf>,
    #[arg(long)]
    pub busy_timeout_ms: Option<u64>,
    /// SQL catalog with `-- Query N: description` blocks
    #[arg(long)]
    pub queries_file: Option<PathBuf>,
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
    /// Dataset scale label used in output names
    #[arg(long)]
    pub scale: Option<String>,
    /// Index configuration label used in output names
    #[arg(long)]
    pub index_config: Option<String>,
    #[arg(long)]
    pub warmup_runs: Option<u32>,
    #[arg(long)]
    pub measurement_runs: Option<u32>,
    /// Worker count for throughput mode (1-16)
    #[arg(long)]
    pub concurrency: Option<u32>,
    /// Throughput window in seconds (20-60)
    #[arg(long = "duration")]
    pub duration_seconds: Option<u32>,
    /// Seconds to wait for in-flight probes after the window closes
    #[arg(long = "grace")]
    pub grace_seconds: Option<f64>,
    /// Only run these query numbers (repeatable)
    #[arg(long = "query", value_name = "N")]
    pub queries: Vec<u32>,
}

impl RunArgs {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            database_path: self.database.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            queries_file: self.queries_file.clone(),
            results_dir: self.results_dir.clone(),
            scale: self.scale.clone(),
            index_config: self.index_config.clone(),
            warmup_runs: self.warmup_runs,
            measurement_runs: self.measurement_runs,
            concurrency: self.concurrency,
            duration_seconds: self.duration_seconds,
            grace_seconds: self.grace_seconds,
        }
    }
}

/// Parse the process arguments and run. Returns the process exit code.
#[must_use]
pub fn run() -> i32 {
    run_from(std::env::args_os())
}

/// Like [`run`] with explicit arguments (the first one is the program name).
pub fn run_from<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return err.exit_code();
        }
    };
    init_tracing(cli.verbose);
    match execute(cli) {
        Ok(()) => ExitStatus::Success.code(),
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_status().code()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Ignore a second initialisation when run_from is called repeatedly.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn execute(cli: Cli) -> CliResult<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Latency(args) => handle_latency(&resolve_config(config_path, &args)?, &args),
        Commands::Throughput(args) => {
            handle_throughput(&resolve_config(config_path, &args)?, &args)
        }
        Commands::Queries(args) => handle_queries(&resolve_config(config_path, &args)?, &args),
        Commands::Config(args) => {
            let config = resolve_config(config_path, &args)?;
            print!("{}", config.bootstrap_summary().format());
            Ok(())
        }
        Commands::Compare {
            baseline,
            candidate,
        } => handle_compare(&baseline, &candidate),
    }
}

/// Defaults, config file, environment, then CLI flags.
fn resolve_config(config_path: Option<&Path>, args: &RunArgs) -> CliResult<RunConfig> {
    let mut config = RunConfig::load(config_path)?;
    config.apply_layer(&args.layer(), ConfigSource::CliArg);
    Ok(config)
}

fn load_catalog(config: &RunConfig, args: &RunArgs) -> CliResult<QueryCatalog> {
    let catalog = QueryCatalog::load(&config.queries_file)?;
    Ok(catalog.select(&args.queries)?)
}

fn handle_latency(config: &RunConfig, args: &RunArgs) -> CliResult<()> {
    config.validate_for(BenchMode::Latency)?;
    let catalog = load_catalog(config, args)?;
    tracing::info!(
        queries = catalog.len(),
        warmup_runs = config.warmup_runs,
        measurement_runs = config.measurement_runs,
        database = %config.store.database_path.display(),
        "starting latency benchmarks"
    );
    let provider = SqliteProvider::new(&config.store);
    let report = run_latency_suite(&provider, &catalog, config)?;
    finish(&report, config)
}

fn handle_throughput(config: &RunConfig, args: &RunArgs) -> CliResult<()> {
    config.validate_for(BenchMode::Throughput)?;
    let catalog = load_catalog(config, args)?;
    tracing::info!(
        queries = catalog.len(),
        concurrency = config.concurrency,
        duration_seconds = config.duration_seconds,
        database = %config.store.database_path.display(),
        "starting throughput benchmarks"
    );
    let provider = Arc::new(SqliteProvider::new(&config.store));
    let report = run_throughput_suite(provider, &catalog, config)?;
    finish(&report, config)
}

fn finish(report: &BenchmarkReport, config: &RunConfig) -> CliResult<()> {
    let paths = report.persist(&config.results_dir)?;
    print!("{}", output::render_report(report, &paths));
    let total = report.metadata.total_queries;
    if total > 0 && report.metadata.succeeded_queries == 0 {
        return Err(CliError::AllQueriesFailed(total));
    }
    Ok(())
}

fn handle_queries(config: &RunConfig, args: &RunArgs) -> CliResult<()> {
    let catalog = load_catalog(config, args)?;
    print!("{}", output::render_catalog(&catalog));
    Ok(())
}

fn handle_compare(baseline: &Path, candidate: &Path) -> CliResult<()> {
    let base = BenchmarkReport::load(baseline)?;
    let cand = BenchmarkReport::load(candidate)?;
    if base.metadata.mode != cand.metadata.mode {
        return Err(CliError::InvalidArgument(format!(
            "cannot compare a {} report with a {} report",
            base.metadata.mode, cand.metadata.mode
        )));
    }
    print!("{}", output::render_comparison(&base, &cand));
    Ok(())
}
