//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use assetenrich_core::{
    BatchContext, BatchProgress, BatchResult, FileFailureLog, export_checkpoint,
    renormalize_checkpoint, rerun_pending, run_batch,
};
use assetenrich_lookup::HttpLookupProvider;
use assetenrich_shared::{
    AppConfig, BatchConfig, BatchId, config_file_path, init_config, load_config,
    load_config_from,
};
use assetenrich_storage::{CsvSink, CsvSource, RecordSink, find_unenriched, load_checkpoint};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Look up warranty expiration dates for an asset inventory.
#[derive(Parser)]
#[command(
    name = "assetenrich",
    version,
    about = "Enrich an asset inventory with vendor warranty expiration dates.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.assetenrich/assetenrich.toml.
    #[arg(long, global = true, env = "ASSETENRICH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
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
    /// Load an inventory CSV and look up every matching asset.
    Run {
        /// Inventory CSV to read.
        #[arg(short, long)]
        input: PathBuf,

        /// CSV report to write (enriched assets only).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only assets whose category column contains this text.
        #[arg(long)]
        category: Option<String>,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Retry the assets a previous run left without a date.
    Retry {
        /// CSV report to write after the retry.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Export the enriched entries of a checkpoint to CSV.
    Export {
        /// CSV report to write.
        #[arg(short, long)]
        output: PathBuf,

        /// Checkpoint to read (defaults to the configured path).
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Re-parse every date in a checkpoint and rewrite it in display format.
    Renormalize {
        /// Checkpoint to rewrite (defaults to the configured path).
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// List checkpoint entries that have no warranty date.
    Missing {
        /// Checkpoint to read (defaults to the configured path).
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags shared by commands that run the worker pool.
#[derive(Args, Debug, Default)]
pub(crate) struct BatchArgs {
    /// Number of concurrent lookup workers.
    #[arg(short = 'j', long)]
    pub pool_size: Option<usize>,

    /// Per-lookup timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// JSON checkpoint path.
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Failure log path.
    #[arg(long)]
    pub failure_log: Option<PathBuf>,
}

impl BatchArgs {
    /// Overlay the flags that were given onto `config`.
    fn apply(&self, mut config: BatchConfig) -> BatchConfig {
        if let Some(n) = self.pool_size {
            config.pool_size = n;
        }
        if let Some(secs) = self.timeout {
            config.lookup_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = &self.checkpoint {
            config.checkpoint_path = path.clone();
        }
        if let Some(path) = &self.failure_log {
            config.failure_log_path = path.clone();
        }
        config
    }
}

/// Reject flag overrides the config file validation would have refused.
fn check_batch(config: &BatchConfig) -> Result<()> {
    if config.pool_size == 0 {
        return Err(eyre!("--pool-size must be at least 1"));
    }
    if config.lookup_timeout.is_zero() {
        return Err(eyre!("--timeout must be at least 1 second"));
    }
    Ok(())
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
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "assetenrich=info",
        1 => "assetenrich=debug",
        _ => "assetenrich=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            input,
            output,
            category,
            batch,
        } => cmd_run(config_path, &input, output.as_deref(), category, &batch).await,
        Command::Retry { output, batch } => cmd_retry(config_path, output.as_deref(), &batch).await,
        Command::Export { output, checkpoint } => {
            cmd_export(config_path, &output, checkpoint.as_deref())
        }
        Command::Renormalize { checkpoint } => cmd_renormalize(config_path, checkpoint.as_deref()),
        Command::Missing { checkpoint } => cmd_missing(config_path, checkpoint.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Load the config file named on the command line, or the default one.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Build the collaborators for a pool run.
fn batch_context(app: &AppConfig, batch: &BatchConfig) -> Result<BatchContext> {
    let batch_id = BatchId::new();
    let failures = FileFailureLog::open(&batch.failure_log_path, batch_id.clone())?;
    let provider = HttpLookupProvider::new(app.lookup.clone())?;

    Ok(BatchContext {
        batch_id,
        provider: Arc::new(provider),
        normalizer: Arc::new(app.lookup.normalizer()),
        failures: Arc::new(failures),
        progress: Arc::new(CliProgress::new()),
    })
}

async fn cmd_run(
    config_path: Option<&Path>,
    input: &Path,
    output: Option<&Path>,
    category: Option<String>,
    args: &BatchArgs,
) -> Result<()> {
    let mut app = resolve_config(config_path)?;
    if let Some(category) = category {
        app.source.category = category;
    }
    let batch = args.apply(BatchConfig::from(&app));
    check_batch(&batch)?;
    let ctx = batch_context(&app, &batch)?;

    info!(
        input = %input.display(),
        category = %app.source.category,
        pool_size = batch.pool_size,
        "running batch"
    );

    let source = CsvSource::new(input, app.source.clone());
    let sink = output.map(CsvSink::new);
    let result = run_batch(
        &batch,
        &source,
        sink.as_ref().map(|s| s as &dyn RecordSink),
        &ctx,
    )
    .await?;

    print_summary(&result, &batch, sink.as_ref());
    Ok(())
}

async fn cmd_retry(config_path: Option<&Path>, output: Option<&Path>, args: &BatchArgs) -> Result<()> {
    let app = resolve_config(config_path)?;
    let batch = args.apply(BatchConfig::from(&app));
    check_batch(&batch)?;
    if !batch.checkpoint_path.exists() {
        return Err(eyre!(
            "no checkpoint at '{}', run `assetenrich run` first",
            batch.checkpoint_path.display()
        ));
    }
    let ctx = batch_context(&app, &batch)?;

    let sink = output.map(CsvSink::new);
    let result = rerun_pending(&batch, sink.as_ref().map(|s| s as &dyn RecordSink), &ctx).await?;

    print_summary(&result, &batch, sink.as_ref());
    Ok(())
}

fn cmd_export(config_path: Option<&Path>, output: &Path, checkpoint: Option<&Path>) -> Result<()> {
    let app = resolve_config(config_path)?;
    let checkpoint = checkpoint
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&app.defaults.checkpoint_path));

    let sink = CsvSink::new(output);
    let rows = export_checkpoint(&checkpoint, &app.lookup.normalizer(), &sink)?;
    println!("Exported {rows} assets to {}", output.display());
    Ok(())
}

fn cmd_renormalize(config_path: Option<&Path>, checkpoint: Option<&Path>) -> Result<()> {
    let app = resolve_config(config_path)?;
    let checkpoint = checkpoint
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&app.defaults.checkpoint_path));

    let count = renormalize_checkpoint(&checkpoint, &app.lookup.normalizer())?;
    println!("Rewrote {count} entries in {}", checkpoint.display());
    Ok(())
}

fn cmd_missing(config_path: Option<&Path>, checkpoint: Option<&Path>) -> Result<()> {
    let app = resolve_config(config_path)?;
    let checkpoint = checkpoint
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&app.defaults.checkpoint_path));

    let entries = load_checkpoint(&checkpoint)?;
    let missing = find_unenriched(&entries);
    if missing.is_empty() {
        println!("All {} entries have a warranty date.", entries.len());
        return Ok(());
    }

    println!("{} of {} entries have no warranty date:", missing.len(), entries.len());
    for entry in missing {
        println!("  {:<16} {}", entry.asset_id, entry.serial_number);
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config written to {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let rendered = toml::to_string_pretty(&config)?;
    match config_path {
        Some(p) => println!("# {}", p.display()),
        None => println!("# {}", config_file_path()?.display()),
    }
    println!("{rendered}");
    Ok(())
}

fn print_summary(result: &BatchResult, batch: &BatchConfig, sink: Option<&CsvSink>) {
    println!();
    println!("  Batch complete.");
    println!("  ID:          {}", result.batch_id);
    println!("  Records:     {}", result.output.records.len());
    println!("  Enriched:    {}", result.output.enriched_count());
    println!("  Pending:     {}", result.output.pending_count());
    println!("  Checkpoint:  {}", batch.checkpoint_path.display());
    if let Some(sink) = sink {
        println!("  Report:      {}", sink.path().display());
    }
    if result.output.pending_count() > 0 {
        println!("  Failures:    {}", batch.failure_log_path.display());
    }
    println!("  Time:        {:.1}s", result.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl BatchProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn record_finished(&self, asset_id: &str, enriched: bool, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
        let status = if enriched { "ok" } else { "failed" };
        self.bar.set_message(format!("{asset_id} {status}"));
    }

    fn done(&self, _result: &BatchResult) {
        self.bar.finish_and_clear();
    }
}
