//! knowbench - knowledge-probe benchmark runner for language models
//!
//! ## Commands
//!
//! - `run`: ask every question of a bank to every (model, temperature) pair
//! - `check`: probe the model server
//! - `validate`: parse a question bank and list malformed lines
//! - `report`: aggregate an existing results ledger

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use knowbench_core::client::{DEFAULT_API_URL, DEFAULT_BASE_URL};
use knowbench_core::metrics::METRICS;
use knowbench_core::{
    load_bank, run_sweep, ClientConfig, ConsoleProgress, DriverOptions, HttpModelClient,
    LedgerReport, NoProgress, ProgressSink, RunConfig,
};
use knowbench_ledger::{CsvLedger, ResultLedger};

const DEFAULT_BANK: &str = "items.jsonl";
const DEFAULT_RESULTS: &str = "results/results.csv";

#[derive(Parser)]
#[command(name = "knowbench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Knowledge-probe benchmark runner for language models", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines, and JSON instead of text for summaries and reports.
    /// Per-question progress then appears only as `question.scored` log events
    /// on stderr.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the question bank against one or more models and temperatures
    Run(RunArgs),

    /// Check that the model server is reachable
    Check {
        /// Server root to probe
        #[arg(long, env = "KNOWBENCH_BASE_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },

    /// Parse a question bank and report malformed lines
    Validate {
        /// Question bank (JSON Lines)
        #[arg(long, env = "KNOWBENCH_BANK", default_value = DEFAULT_BANK)]
        bank: PathBuf,
    },

    /// Summarise an existing results ledger
    Report {
        /// Results ledger (CSV)
        #[arg(long, env = "KNOWBENCH_RESULTS", default_value = DEFAULT_RESULTS)]
        results: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Question bank (JSON Lines)
    #[arg(long, env = "KNOWBENCH_BANK", default_value = DEFAULT_BANK)]
    bank: PathBuf,

    /// Results ledger (CSV), created if missing and appended to otherwise
    #[arg(long, env = "KNOWBENCH_RESULTS", default_value = DEFAULT_RESULTS)]
    results: PathBuf,

    /// Model to benchmark (repeatable)
    #[arg(short, long = "model", required = true, num_args = 1..)]
    models: Vec<String>,

    /// Sampling temperature (repeatable)
    #[arg(
        short,
        long = "temperature",
        num_args = 1..,
        default_values_t = [0.1],
        value_parser = parse_temperature
    )]
    temperatures: Vec<f64>,

    /// Chat-completions endpoint
    #[arg(long, env = "KNOWBENCH_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Server root probed before the run
    #[arg(long, env = "KNOWBENCH_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "KNOWBENCH_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// Delay between questions in milliseconds
    #[arg(long, env = "KNOWBENCH_PACING_MS", default_value_t = 1000)]
    pacing_ms: u64,

    /// Extra attempts after a transport failure
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Skip questions already recorded for the same model and temperature
    #[arg(long)]
    skip_completed: bool,

    /// Run all configurations at once instead of one after another
    #[arg(long)]
    concurrent: bool,

    /// Do not probe the server before starting
    #[arg(long)]
    skip_health_check: bool,
}

fn parse_temperature(s: &str) -> std::result::Result<f64, String> {
    let t: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a number"))?;
    if !(0.0..=2.0).contains(&t) {
        return Err(format!("temperature {t} is outside 0.0..=2.0"));
    }
    Ok(t)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    knowbench_core::telemetry::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args, cli.json).await,
        Commands::Check { base_url } => cmd_check(&base_url).await,
        Commands::Validate { bank } => cmd_validate(&bank),
        Commands::Report { results } => cmd_report(&results, cli.json),
    };

    METRICS.flush();
    result
}

/// Run every configuration and print one summary per configuration.
async fn cmd_run(args: RunArgs, json: bool) -> Result<()> {
    let bank = load_bank(&args.bank)
        .with_context(|| format!("Failed to load question bank {}", args.bank.display()))?;
    if !bank.is_clean() {
        warn!(
            rejected = bank.rejected.len(),
            "some questions were skipped; run `knowbench validate` for details"
        );
    }
    if bank.questions.is_empty() {
        bail!("question bank {} has no valid questions", args.bank.display());
    }

    let config = ClientConfig::default()
        .with_api_url(args.api_url)
        .with_base_url(args.base_url)
        .with_timeout(Duration::from_secs(args.timeout_secs));
    let client = HttpModelClient::new(config).context("Failed to create model client")?;

    if !args.skip_health_check {
        client
            .check_server()
            .await
            .context("Model server is not reachable; start it or pass --skip-health-check")?;
        info!(url = %client.config().base_url, "model server reachable");
    }

    let ledger: Arc<dyn ResultLedger> = Arc::new(
        CsvLedger::open(&args.results)
            .with_context(|| format!("Failed to open results ledger {}", args.results.display()))?,
    );

    let configs = RunConfig::grid(&args.models, &args.temperatures);
    let options = DriverOptions {
        pacing: Duration::from_millis(args.pacing_ms),
        max_retries: args.retries,
        skip_completed: args.skip_completed,
    };
    let progress: &dyn ProgressSink = if json { &NoProgress } else { &ConsoleProgress };

    let summaries = run_sweep(
        &configs,
        &bank.questions,
        &client,
        ledger,
        &options,
        progress,
        args.concurrent,
    )
    .await
    .context("Benchmark run aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("\n\n--- Benchmark Complete: Final Summary ---");
    for summary in &summaries {
        println!("{}", summary.render_text());
        println!("{}", "-".repeat(20));
    }
    println!("Results appended to {}", args.results.display());

    Ok(())
}

/// Probe the model server.
async fn cmd_check(base_url: &str) -> Result<()> {
    let client = HttpModelClient::new(ClientConfig::default().with_base_url(base_url))
        .context("Failed to create model client")?;
    client
        .check_server()
        .await
        .context("Model server is not reachable")?;
    println!("Successfully connected to the server at {base_url}");
    Ok(())
}

/// Parse a bank and list every rejected line. Fails when any line was rejected.
fn cmd_validate(path: &Path) -> Result<()> {
    let bank = load_bank(path)
        .with_context(|| format!("Failed to load question bank {}", path.display()))?;

    println!(
        "{}: {} valid question(s), {} rejected line(s)",
        path.display(),
        bank.questions.len(),
        bank.rejected.len()
    );
    println!("sha256: {}", bank.digest);
    for rejected in &bank.rejected {
        println!("  {rejected}");
    }

    if !bank.is_clean() {
        bail!("{} malformed line(s) in {}", bank.rejected.len(), path.display());
    }
    Ok(())
}

/// Aggregate a results ledger.
fn cmd_report(path: &Path, json: bool) -> Result<()> {
    let records = CsvLedger::read_path(path)
        .with_context(|| format!("Failed to read results ledger {}", path.display()))?;
    let report = LedgerReport::from_records(&records);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Loaded {} results from {}", records.len(), path.display());
        println!("{}", report.render_text());
    }
    Ok(())
}
