//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docpipe_backends::Services;
use docpipe_core::{Outcome, Pipeline, ProgressReporter, RunReport, Stage};
use docpipe_shared::{
    AppConfig, PipelineConfig, SourceItem, config_file_path, init_config, load_config,
    load_config_from,
};
use docpipe_state::{SourceLock, StateTracker};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docpipe: archive scraped documents with verified, canonical metadata.
#[derive(Parser)]
#[command(
    name = "docpipe",
    version,
    about = "Parse, rename, archive, and index scraped documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.docpipe/docpipe.toml).
    #[arg(long, global = true, env = "DOCPIPE_CONFIG")]
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
    /// Process a scraper's item manifest.
    Run {
        /// Source (scraper) name; selects the state file.
        #[arg(long)]
        source: String,

        /// JSON manifest of scraped items.
        #[arg(long)]
        items: PathBuf,

        /// Process items even if they were already archived.
        #[arg(long)]
        force: bool,

        /// Remove a lock left behind by a crashed run first.
        #[arg(long)]
        break_lock: bool,

        /// Process at most this many items.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Inspect or edit per-source state.
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// State subcommands.
#[derive(Subcommand)]
pub(crate) enum StateAction {
    /// Print statistics and records for a source.
    Show {
        #[arg(long)]
        source: String,
    },
    /// Drop one URL's record so the next run processes it again.
    Forget {
        #[arg(long)]
        source: String,
        #[arg(long)]
        url: String,
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
        0 => "docpipe=info",
        1 => "docpipe=debug",
        _ => "docpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
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
            source,
            items,
            force,
            break_lock,
            limit,
        } => {
            let opts = RunOptions {
                source,
                items,
                force,
                break_lock,
                limit,
            };
            cmd_run(config_path, opts).await
        }
        Command::State { action } => match action {
            StateAction::Show { source } => cmd_state_show(config_path, &source).await,
            StateAction::Forget { source, url } => {
                cmd_state_forget(config_path, &source, &url).await
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

fn resolve_pipeline_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let app = resolve_config(path)?;
    Ok(PipelineConfig::try_from(&app)?)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunOptions {
    source: String,
    items: PathBuf,
    force: bool,
    break_lock: bool,
    limit: Option<usize>,
}

async fn cmd_run(config_path: Option<&Path>, opts: RunOptions) -> Result<()> {
    let config = resolve_pipeline_config(config_path)?;

    let services = Services::from_config(&config);
    services.check().await?;

    if opts.break_lock {
        SourceLock::break_lock(&config.state_dir, &opts.source)?;
    }
    let _lock = SourceLock::acquire(&config.state_dir, &opts.source)?;
    let state = Arc::new(StateTracker::load(&config.state_dir, &opts.source).await?);

    let mut items = SourceItem::load_manifest(&opts.items)?;
    if let Some(limit) = opts.limit {
        items.truncate(limit);
    }

    info!(
        source = %opts.source,
        items = items.len(),
        force = opts.force,
        "processing manifest"
    );

    let pipeline = Pipeline::new(services, state, config)?.with_force(opts.force);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight items");
            on_signal.cancel();
        }
    });

    let reporter = CliProgress::new();
    let report = pipeline.run(items, cancel, &reporter).await;

    print_summary(&opts.source, &report);

    let failed = report.failed().count();
    if failed > 0 {
        return Err(eyre!("{failed} item(s) failed"));
    }
    Ok(())
}

fn print_summary(source: &str, report: &RunReport) {
    let s = &report.stats;
    println!();
    println!("  Run {} for '{source}'", report.run_id);
    println!("  Scraped:     {}", s.scraped);
    println!("  Downloaded:  {}", s.downloaded);
    println!("  Parsed:      {}", s.parsed);
    println!("  Archived:    {}", s.archived);
    println!("  Verified:    {}", s.verified);
    println!("  RAG indexed: {}", s.rag_indexed);
    println!("  Skipped:     {}", s.skipped);
    println!(
        "  Failed:      {} (parse {}, archive {}, verify {})",
        s.failed, s.parse_failed, s.archive_failed, s.verify_failed
    );
    if s.rag_failed > 0 {
        println!("  RAG errors:  {}", s.rag_failed);
    }
    if s.state_errors > 0 {
        println!("  State errors: {}", s.state_errors);
    }
    println!("  Time:        {:.1}s", s.elapsed.as_secs_f64());

    for item in report.failed() {
        println!("  ✗ {}: {}", item.url, item.outcome.label());
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    finished: AtomicUsize,
    total: AtomicUsize,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            finished: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    fn counts(&self) -> (usize, usize) {
        (
            self.finished.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

impl ProgressReporter for CliProgress {
    fn started(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.spinner.set_message(format!("Processing {total} item(s)"));
    }

    fn stage(&self, url: &str, stage: Stage) {
        let (finished, total) = self.counts();
        self.spinner
            .set_message(format!("[{finished}/{total}] {stage} {url}"));
    }

    fn item_finished(&self, url: &str, outcome: &Outcome, finished: usize, total: usize) {
        self.finished.store(finished, Ordering::Relaxed);
        if outcome.is_failed() {
            self.spinner.println(format!("  ✗ {url}: {}", outcome.label()));
        }
        self.spinner.set_message(format!("[{finished}/{total}] {url}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// state
// ---------------------------------------------------------------------------

async fn cmd_state_show(config_path: Option<&Path>, source: &str) -> Result<()> {
    let config = resolve_pipeline_config(config_path)?;
    let tracker = StateTracker::load(&config.state_dir, source).await?;
    let state = tracker.snapshot().await;
    let stats = &state.statistics;

    println!();
    println!("  Source:       {}", state.scraper_name);
    println!("  State file:   {}", tracker.path().display());
    println!("  Created:      {}", state.created_at.to_rfc3339());
    println!("  Last updated: {}", state.last_updated.to_rfc3339());
    println!(
        "  Totals:       processed {}, downloaded {}, skipped {}, failed {}",
        stats.total_processed, stats.total_downloaded, stats.total_skipped, stats.total_failed
    );
    println!();

    for (url, record) in &state.processed_urls {
        let detail = record
            .detail
            .as_deref()
            .or(record.document_id.as_deref())
            .unwrap_or("");
        println!(
            "  {:<9} {}  {url}  {detail}",
            record.status.as_str(),
            record.processed_at.format("%Y-%m-%d %H:%M"),
        );
    }
    if !state.processed_urls.is_empty() {
        println!();
    }
    Ok(())
}

async fn cmd_state_forget(config_path: Option<&Path>, source: &str, url: &str) -> Result<()> {
    let config = resolve_pipeline_config(config_path)?;
    let _lock = SourceLock::acquire(&config.state_dir, source)?;
    let tracker = StateTracker::load(&config.state_dir, source).await?;

    if tracker.forget(url).await? {
        println!("Forgot {url}; it will be processed on the next run.");
    } else {
        println!("No record for {url} in '{source}'.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    PipelineConfig::try_from(&config)?;

    let source = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", source.display());
    println!("{toml_str}");
    Ok(())
}
