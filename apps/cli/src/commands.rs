//! CLI command definitions, routing, and tracing setup.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use neuraltheft_core::pipeline::{self, HarvestSummary, ProgressReporter};
use neuraltheft_shared::{
    AppConfig, CollectedRecord, EnrichedRecord, HarvestError, LogLevel, RunConfig, init_config,
    load_config, load_config_from, resolve_credential,
};
use neuraltheft_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// neuraltheft — harvest ranked leaderboard players into a local database.
#[derive(Parser)]
#[command(
    name = "neuraltheft",
    version,
    about = "Harvest ranked leaderboard players and their account identifiers into SQLite.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.neuraltheft/neuraltheft.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// The one verbosity value used for both log filtering and the run config.
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_verbosity(self.verbose)
    }
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Walk the leaderboard, resolve identifiers, and store every player.
    Run(RunArgs),

    /// Print how many players a database holds.
    Count {
        /// Database to inspect (defaults to the configured output).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `neuraltheft run`. Unset flags fall back to the config file.
#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Leaderboard region (na, eu, ap, kr, latam, br).
    #[arg(long)]
    pub region: Option<String>,

    /// Output database path.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Identifier lookups per minute.
    #[arg(long)]
    pub speed: Option<f64>,

    /// Lookup API key.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub token: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli, level: LogLevel) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli, level: LogLevel) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => cmd_run(config_path, level, args).await,
        Command::Count { output } => cmd_count(config_path, output).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn load_app_config(path: Option<&Path>) -> Result<AppConfig, HarvestError> {
    match path {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
}

/// Merge flags over the config file: CLI > file > built-in defaults.
fn build_run_config(app: &AppConfig, level: LogLevel, args: RunArgs) -> Result<RunConfig> {
    let credential = resolve_credential(args.token.as_deref(), app)?;
    let mut config = RunConfig::from_app_config(app, credential);
    if let Some(region) = args.region {
        config.region = region;
    }
    if let Some(output) = args.output {
        config.output_path = output;
    }
    if let Some(speed) = args.speed {
        config.rate_per_minute = speed;
    }
    config.log_level = level;
    config.validate()?;
    Ok(config)
}

async fn cmd_run(config_path: Option<&Path>, level: LogLevel, args: RunArgs) -> Result<()> {
    let app = load_app_config(config_path)?;
    let config = build_run_config(&app, level, args)?;

    print_banner(&config);
    info!(?config, "starting run");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if watch_interrupts(&cancel, tokio::signal::ctrl_c).await {
                eprintln!("second interrupt, exiting without waiting for the open batch");
                std::process::exit(130);
            }
        }
    });

    let reporter = Arc::new(CliProgress::new());
    let summary = pipeline::harvest(&config, cancel, reporter).await?;
    print_summary(&summary);

    Ok(())
}

/// Cancel the run on the first interrupt. Resolves to `true` on a second
/// one, which the caller treats as a request to exit immediately.
async fn watch_interrupts<F, Fut>(cancel: &CancellationToken, mut interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    warn!("interrupt received, waiting for the pipeline to unwind (Ctrl-C again to abort)");
    cancel.cancel();

    interrupt().await.is_ok()
}

async fn cmd_count(config_path: Option<&Path>, output: Option<PathBuf>) -> Result<()> {
    let app = load_app_config(config_path)?;
    let path = output.unwrap_or_else(|| PathBuf::from(&app.defaults.output));
    if !path.exists() {
        return Err(eyre!("no database found at '{}'", path.display()));
    }

    let storage = Storage::open(&path).await?;
    let count = storage.count_players().await?;
    println!("{count}");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Console output
// ---------------------------------------------------------------------------

fn print_banner(config: &RunConfig) {
    println!();
    println!("  neuraltheft {}", env!("CARGO_PKG_VERSION"));
    println!("  Region:  {}", config.region);
    println!("  Output:  {}", config.output_path.display());
    println!("  Speed:   {} lookups/min", config.rate_per_minute);
    println!("  Verbose: {}", config.log_level.is_verbose());
    println!();
}

fn print_summary(summary: &HarvestSummary) {
    println!();
    if summary.cancelled {
        println!("  Run interrupted; the open batch was rolled back.");
    } else {
        println!("  Harvest complete!");
    }
    println!("  Run:        {}", summary.run_id);
    println!("  Started:    {}", summary.started_at.to_rfc3339());
    println!("  Pages:      {}", summary.collect.pages_visited);
    println!("  Collected:  {}", summary.collect.records_emitted);
    println!("  Resolved:   {}", summary.enrich.resolved);
    println!("  Failed:     {}", summary.enrich.failed);
    println!("  Stored:     {}", summary.persist.persisted);
    println!("  Duplicates: {}", summary.persist.duplicates);
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner showing the running stored count.
struct CliProgress {
    spinner: ProgressBar,
    stored: AtomicUsize,
    failed: AtomicUsize,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner.set_message("Waiting for the first player");
        Self {
            spinner,
            stored: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    fn refresh(&self) {
        let stored = self.stored.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        self.spinner
            .set_message(format!("{stored} players stored, {failed} lookups failed"));
    }
}

impl ProgressReporter for CliProgress {
    fn lookup_failed(&self, _record: &CollectedRecord, _error: &HarvestError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.refresh();
    }

    fn record_persisted(&self, _record: &EnrichedRecord, stored: usize) {
        self.stored.store(stored, Ordering::Relaxed);
        self.refresh();
    }

    fn done(&self, _summary: &HarvestSummary) {
        self.spinner.finish_and_clear();
    }
}
