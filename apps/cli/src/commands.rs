//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use lexenrich_core::{BatchProgress, BatchReport, LiveWorkerFactory, RecordOutcome, run_batch};
use lexenrich_document::{DocumentSource, extract_definition_by_source, normalize, serialize};
use lexenrich_shared::{
    AppConfig, BatchSettings, LexError, init_config, load_config, load_config_from,
    resolve_api_key,
};
use lexenrich_storage::LexiconStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// lexenrich: expand lexical entries with generated descriptions.
#[derive(Parser)]
#[command(
    name = "lexenrich",
    version,
    about = "Enrich lexical entry documents with generated long-form descriptions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.lexenrich/lexenrich.toml).
    #[arg(long, global = true, env = "LEXENRICH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
    /// Enrich every record past the resume checkpoint.
    Run {
        /// Only records with an id greater than this are processed.
        #[arg(long)]
        start_index: Option<i64>,

        /// Number of concurrent workers.
        #[arg(long)]
        workers: Option<usize>,

        /// Normalize and merge a placeholder; no service calls, no writes.
        #[arg(long)]
        dry_run: bool,
    },

    /// Normalize a document file and print its canonical form (`-` reads stdin).
    Normalize {
        /// Path to an XML document.
        file: PathBuf,
    },

    /// Show one record's normalized document and short definition.
    Show {
        /// Record id.
        id: i64,
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
        0 => "lexenrich=info",
        1 => "lexenrich=debug",
        _ => "lexenrich=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
            start_index,
            workers,
            dry_run,
        } => cmd_run(config_path, start_index, workers, dry_run).await,
        Command::Normalize { file } => cmd_normalize(&file),
        Command::Show { id } => cmd_show(config_path, id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    start_index: Option<i64>,
    workers: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let config = resolve_config(config_path)?;

    let mut settings = BatchSettings::from(&config);
    if let Some(start) = start_index {
        settings.start_index = start;
    }
    if let Some(n) = workers {
        if n == 0 {
            return Err(eyre!("--workers must be at least 1"));
        }
        settings.workers = n;
    }
    settings.dry_run = dry_run;

    // No credential is needed when nothing is sent to the service.
    let factory = if dry_run {
        LiveWorkerFactory::new(&config, String::new()).readonly()
    } else {
        LiveWorkerFactory::new(&config, resolve_api_key(&config)?)
    };

    let planned = LexiconStore::open_readonly(&config.store)
        .await?
        .count_candidates(settings.start_index)
        .await?;
    info!(
        start_index = settings.start_index,
        workers = settings.workers,
        dry_run,
        planned,
        "starting enrichment run"
    );

    let reporter = CliProgress::new(dry_run);
    let result = run_batch(&settings, &factory, &reporter).await;
    reporter.bar.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(err @ LexError::BatchAborted { id, .. }) => {
            tracing::error!(id, error = %err, "batch aborted");
            return Err(err).wrap_err(format!("enrichment stopped at record {id}"));
        }
        Err(err) => return Err(err.into()),
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!();
    if report.dry_run {
        println!("  Dry run complete; nothing was written.");
    } else {
        println!("  Enrichment complete!");
    }
    println!("  Run:        {}", report.run_id);
    println!("  Started:    {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Candidates: {}", report.candidates);
    if report.dry_run {
        println!("  Would write: {}", report.persisted);
    } else {
        println!("  Persisted:  {}", report.persisted);
    }
    println!("  Skipped:    {}", report.skipped);
    println!("  No source definition: {}", report.definitions_not_found);
    if report.zero_row_updates > 0 {
        println!("  Missing rows: {}", report.zero_row_updates);
    }
    if let Some(last) = report.last_id {
        println!("  Last id:    {last}");
    }
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

fn cmd_normalize(file: &Path) -> Result<()> {
    let source = if file.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .wrap_err("failed to read document from stdin")?;
        DocumentSource::RawText(text)
    } else {
        DocumentSource::FilePath(file.to_path_buf())
    };

    let doc = normalize(&source.load()?)?;
    print!("{}", serialize(&doc)?);
    Ok(())
}

async fn cmd_show(config_path: Option<&Path>, id: i64) -> Result<()> {
    let config = resolve_config(config_path)?;
    let store = LexiconStore::open_readonly(&config.store).await?;

    let record = store
        .fetch_record(id)
        .await?
        .ok_or_else(|| eyre!("no record with id {id} in table '{}'", store.schema().table))?;

    println!("  Id:   {}", record.id);
    println!("  Term: {}", record.term);

    match normalize(&record.document) {
        Ok(doc) => {
            let definition = extract_definition_by_source(&doc, &config.batch.source_tag);
            match definition {
                Some(text) => println!("  Definition ({}): {text}", config.batch.source_tag),
                None => println!("  Definition ({}): <none>", config.batch.source_tag),
            }
            println!();
            print!("{}", serialize(&doc)?);
        }
        Err(err) => {
            warn!(id, error = %err, "stored document does not parse");
            println!("  Document is malformed: {err}");
            println!();
            println!("{}", record.document);
        }
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
    dry_run: bool,
}

impl CliProgress {
    fn new(dry_run: bool) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar, dry_run }
    }
}

impl BatchProgress for CliProgress {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message("enriching");
    }

    fn record_done(&self, outcome: &RecordOutcome, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
        self.bar.set_message(format!("id {}", outcome.id));
        if self.dry_run {
            self.bar
                .println(format!("--- record {} ---\n{}", outcome.id, outcome.document));
        }
    }

    fn record_skipped(&self, id: i64, reason: &LexError, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
        self.bar.println(format!("  skipped record {id}: {reason}"));
    }

    fn finished(&self, _report: &BatchReport) {
        self.bar.finish_and_clear();
    }
}
