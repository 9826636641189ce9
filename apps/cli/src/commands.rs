//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use docket_core::{
    CancelFlag, IngestScope, ManifestFeed, MetricsSnapshot, Pipeline, ProgressReporter,
    RunContext,
};
use docket_shared::{
    AppConfig, DateRange, DocumentFailure, Phase, PipelineConfig, init_config, load_config,
    load_config_from,
};
use docket_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Docket: landing and processing zones for published decisions.
#[derive(Parser)]
#[command(
    name = "docket",
    version,
    about = "Ingest published decisions into a deduplicated landing zone and process them into versioned text.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.docket/docket.toml).
    #[arg(long, global = true, env = "DOCKET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory; overrides `storage.data_dir`.
    #[arg(long, global = true, env = "DOCKET_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Ingest the documents listed in a discovery manifest.
    Ingest {
        /// First published date to ingest (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// Last published date to ingest (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Only ingest documents from this issuing body.
        #[arg(long)]
        body: Option<String>,

        /// JSON Lines manifest produced by the discovery crawl.
        #[arg(long)]
        manifest: PathBuf,

        /// Documents ingested in parallel; overrides `ingest.concurrency`.
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Process landing documents into the processed zone.
    Process {
        /// First day of the range (YYYY-MM-DD). Widened to its partition.
        #[arg(long)]
        start: String,

        /// Last day of the range (YYYY-MM-DD). Widened to its partition.
        #[arg(long)]
        end: String,

        /// Transform version; overrides `process.transform_version`.
        #[arg(long)]
        transform_version: Option<u32>,

        /// Documents processed in parallel; overrides `process.concurrency`.
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Show landing zone statistics.
    Stats {
        /// Count documents processed at this transform version.
        #[arg(long)]
        transform_version: Option<u32>,
    },

    /// List recent runs.
    Runs {
        /// Maximum number of runs to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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
        0 => "docket=info",
        1 => "docket=debug",
        _ => "docket=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so summaries on stdout stay clean.
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
    match &cli.command {
        Command::Ingest {
            start,
            end,
            body,
            manifest,
            concurrency,
        } => cmd_ingest(&cli, start, end, body.clone(), manifest, *concurrency).await,
        Command::Process {
            start,
            end,
            transform_version,
            concurrency,
        } => cmd_process(&cli, start, end, *transform_version, *concurrency).await,
        Command::Stats { transform_version } => cmd_stats(&cli, *transform_version).await,
        Command::Runs { limit } => cmd_runs(&cli, *limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&cli).await,
            ConfigAction::Show => cmd_config_show(&cli).await,
        },
    }
}

/// Load the config file named by `--config`, or the default one.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Runtime config with CLI overrides applied.
fn pipeline_config(cli: &Cli) -> Result<PipelineConfig> {
    let app = resolve_config(cli)?;
    let mut config = PipelineConfig::from(&app);
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

/// Run context that reports to the terminal and stops on Ctrl-C.
fn interactive_context(pipeline: &Pipeline, phase: Phase) -> RunContext {
    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight documents");
            on_signal.cancel();
        }
    });

    pipeline
        .context(phase)
        .with_cancel(cancel)
        .with_progress(Arc::new(CliProgress::new()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    cli: &Cli,
    start: &str,
    end: &str,
    body: Option<String>,
    manifest: &Path,
    concurrency: Option<usize>,
) -> Result<()> {
    let mut config = pipeline_config(cli)?;
    if let Some(n) = concurrency {
        config.ingest_concurrency = n;
    }
    let range = DateRange::parse(start, end)?;

    let pipeline = Pipeline::open(config).await?;
    let scope = IngestScope::new(range, body.clone());
    let mut feed = ManifestFeed::open(manifest, &scope, pipeline.config().date_formats.as_slice())
        .await
        .wrap_err_with(|| format!("cannot read manifest {}", manifest.display()))?;

    info!(%range, body = body.as_deref().unwrap_or("*"), "starting ingestion");

    let ctx = interactive_context(&pipeline, Phase::Ingest);
    let summary = pipeline.ingest_run(range, body, &mut feed, &ctx).await?;

    println!();
    println!("  Ingestion {}", if summary.cancelled { "cancelled" } else { "complete" });
    println!("  Run:        {}", summary.run_id);
    println!("  Ingested:   {}", summary.counts.ingested);
    println!("  Duplicate:  {}", summary.counts.duplicate);
    println!("  Rejected:   {}", summary.counts.rejected);
    println!("  Failed:     {}", summary.counts.failed);
    if feed.skipped() > 0 {
        println!("  Unreadable: {} manifest entries", feed.skipped());
    }
    print_metrics(pipeline.metrics().snapshot(summary.run_id, Phase::Ingest));
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    print_failures(&summary.failures);
    println!();

    Ok(())
}

async fn cmd_process(
    cli: &Cli,
    start: &str,
    end: &str,
    transform_version: Option<u32>,
    concurrency: Option<usize>,
) -> Result<()> {
    let mut config = pipeline_config(cli)?;
    if let Some(n) = concurrency {
        config.process_concurrency = n;
    }
    let range = DateRange::parse(start, end)?;

    let pipeline = Pipeline::open(config).await?;
    let version = transform_version.unwrap_or(pipeline.config().transform_version);
    info!(%range, version, "starting processing");

    let ctx = interactive_context(&pipeline, Phase::Process);
    let summary = pipeline.process_run(range, Some(version), &ctx).await?;

    println!();
    println!("  Processing {}", if summary.cancelled { "cancelled" } else { "complete" });
    println!("  Run:        {}", summary.run_id);
    println!("  Version:    v{version}");
    println!("  Succeeded:  {}", summary.counts.succeeded);
    println!("  Failed:     {}", summary.counts.failed);
    println!("  Skipped:    {}", summary.counts.skipped);
    print_metrics(pipeline.metrics().snapshot(summary.run_id, Phase::Process));
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    print_failures(&summary.failures);
    println!();

    Ok(())
}

async fn cmd_stats(cli: &Cli, transform_version: Option<u32>) -> Result<()> {
    let config = pipeline_config(cli)?;
    let version = transform_version.unwrap_or(config.transform_version);
    let db_path = config.database_path();
    let storage = Storage::open_readonly(&db_path)
        .await
        .wrap_err("no landing zone yet; run `docket ingest` first")?;
    let stats = storage.landing_stats(version).await?;

    println!();
    println!("  Database:   {}", db_path.display());
    println!("  Documents:  {}", stats.total_documents);
    println!("  Processed:  {} (v{version})", stats.processed_documents);
    if let (Some(first), Some(last)) = (stats.earliest_published, stats.latest_published) {
        println!("  Published:  {first} .. {last}");
    }
    if !stats.by_format.is_empty() {
        println!();
        println!("  By format:");
        for (format, n) in &stats.by_format {
            println!("    {format:<10} {n}");
        }
    }
    if !stats.by_body.is_empty() {
        println!();
        println!("  By body:");
        for (body, n) in &stats.by_body {
            println!("    {body:<40} {n}");
        }
    }
    println!();

    Ok(())
}

async fn cmd_runs(cli: &Cli, limit: u32) -> Result<()> {
    let config = pipeline_config(cli)?;
    let storage = Storage::open_readonly(&config.database_path())
        .await
        .wrap_err("no landing zone yet; run `docket ingest` first")?;
    let runs = storage.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    for run in runs {
        let state = match &run.finished_at {
            Some(at) => format!("finished {}", at.format("%Y-%m-%d %H:%M:%S")),
            None => "unfinished".to_string(),
        };
        let counts = run
            .stats
            .as_ref()
            .and_then(|s| s.get("counts"))
            .map(|c| c.to_string())
            .unwrap_or_default();
        println!(
            "{}  {:<7}  {}  {:<28}  {}",
            run.id,
            run.phase,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            state,
            counts
        );
    }

    Ok(())
}

async fn cmd_config_init(cli: &Cli) -> Result<()> {
    let path = init_config(cli.config.as_deref())?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(cli: &Cli) -> Result<()> {
    let mut config = resolve_config(cli)?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.display().to_string();
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_metrics(snapshot: Option<MetricsSnapshot>) {
    let Some(snapshot) = snapshot else {
        return;
    };
    println!("  Success:    {:.1}%", snapshot.success_rate * 100.0);
    println!("  Rate:       {:.1} docs/s", snapshot.documents_per_second);
    if let Some(latency) = snapshot.mean_latency {
        println!("  Latency:    {} ms avg", latency.as_millis());
    }
}

fn print_failures(failures: &[DocumentFailure]) {
    const SHOWN: usize = 10;
    if failures.is_empty() {
        return;
    }
    println!();
    for failure in failures.iter().take(SHOWN) {
        println!("  ! {}: {}", failure.identifier, failure.detail);
    }
    if failures.len() > SHOWN {
        println!("  ... and {} more", failures.len() - SHOWN);
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document(&self, identifier: &str, outcome: &str, completed: usize, total: Option<usize>) {
        let position = match total {
            Some(total) => format!("{completed}/{total}"),
            None => completed.to_string(),
        };
        self.spinner
            .set_message(format!("[{position}] {identifier}: {outcome}"));
    }

    fn done(&self, message: &str) {
        self.spinner.finish_and_clear();
        info!("{message}");
    }
}
