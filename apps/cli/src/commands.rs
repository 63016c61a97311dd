//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use leadfill_core::{EnrichmentPipeline, ProgressReporter, RunConfig, RunSummary, WorkerPool};
use leadfill_lookup::{HttpSessionFactory, build_providers};
use leadfill_shared::{AppConfig, OutputFormat, SessionConfig, init_config, load_config};
use leadfill_storage::load_input;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// leadfill: enrich company records from public lookup sources.
#[derive(Parser)]
#[command(
    name = "leadfill",
    version,
    about = "Enrich company records with registry, professional-network, and directory lookups.",
    long_about = None,
)]
pub(crate) struct Cli {
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

/// Output format as accepted on the command line.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum FormatArg {
    Json,
    JsonSnapshot,
    Table,
    Xlsx,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::JsonSnapshot => OutputFormat::JsonSnapshot,
            FormatArg::Table => OutputFormat::Table,
            FormatArg::Xlsx => OutputFormat::Xlsx,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich the records of an input file into an output file.
    Run(RunArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `leadfill run`. Anything left unset falls back to the config file.
#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    /// Input file: registry export or flat JSON list, or CSV table.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Parallel workers, each with its own lookup session.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Records per batch.
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Run lookup sessions headless.
    #[arg(long, overrides_with = "no_headless")]
    pub headless: bool,

    /// Run lookup sessions with a visible window.
    #[arg(long, overrides_with = "headless")]
    pub no_headless: bool,

    /// Output format.
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// Process every input record, appending after whatever the output holds.
    #[arg(long)]
    pub no_resume: bool,

    /// Providers to apply, in order (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub providers: Vec<String>,
}

impl RunArgs {
    /// Layer the flags that were given over `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(workers) = self.workers {
            config.defaults.workers = workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.defaults.batch_size = batch_size;
        }
        if self.headless {
            config.defaults.headless = true;
        }
        if self.no_headless {
            config.defaults.headless = false;
        }
        if let Some(format) = self.format {
            config.defaults.output_format = format.into();
        }
        if self.no_resume {
            config.output.resume = false;
        }
        if !self.providers.is_empty() {
            config.lookup.providers = self.providers.clone();
        }
    }
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
        0 => "leadfill=info,leadfill_core=info,leadfill_lookup=warn,leadfill_storage=info",
        1 => "leadfill=debug,leadfill_core=debug,leadfill_lookup=info,leadfill_storage=debug",
        _ => "leadfill=trace,leadfill_core=trace,leadfill_lookup=trace,leadfill_storage=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = load_config()?;
    args.apply(&mut config);
    config.validate()?;

    if args.input == args.output {
        return Err(eyre!(
            "input and output must be different files: {}",
            args.input.display()
        ));
    }

    let records = load_input(&args.input)?;
    if records.is_empty() {
        warn!(input = %args.input.display(), "input has no named records");
    }

    let providers = build_providers(&config.lookup)?;
    let provider_names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        records = records.len(),
        providers = ?provider_names,
        workers = config.defaults.workers,
        headless = config.defaults.headless,
        "starting enrichment"
    );

    let pipeline = EnrichmentPipeline::new(providers, config.lookup.provider_timeout());
    let sessions = HttpSessionFactory::new(SessionConfig::from(&config));
    let pool = WorkerPool::new(
        config.defaults.workers,
        Arc::new(sessions),
        Arc::new(pipeline),
    )?;

    let run_config = RunConfig {
        output_path: args.output.clone(),
        format: config.defaults.output_format,
        batch_size: config.defaults.batch_size,
        columns: config.output.columns.clone(),
        resume: config.output.resume,
    };

    // Set up progress reporting
    let reporter = CliProgress::new();

    let summary = match leadfill_core::run_enrichment(&run_config, &pool, records, &reporter).await {
        Ok(summary) => summary,
        Err(e) => {
            reporter.spinner.abandon_with_message("Run stopped");
            return Err(e.into());
        }
    };

    // Print summary
    println!();
    println!("  Enrichment complete!");
    println!("  Run:       {}", summary.run_id);
    println!("  Processed: {}", summary.records_processed);
    println!("  Resumed:   {}", summary.records_resumed);
    println!("  Batches:   {}", summary.batches_processed);
    println!("  Flushed:   {}", summary.batches_flushed);
    if summary.failed_chunks > 0 {
        println!("  Failed:    {} chunk(s), records kept unenriched", summary.failed_chunks);
    }
    println!("  Output:    {}", summary.output_path.display());
    println!(
        "  Time:      {:.1}s",
        summary.elapsed.as_secs_f64()
    );
    println!();

    Ok(())
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn batch_started(&self, batch: usize, total_batches: usize, records: usize) {
        self.spinner.set_message(format!(
            "Enriching batch [{batch}/{total_batches}] ({records} records)"
        ));
    }

    fn batch_flushed(&self, batch: usize, total_batches: usize) {
        self.spinner
            .println(format!("  flushed batch {batch}/{total_batches}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["leadfill", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Run(args) => args,
            Command::Config { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn unset_flags_keep_config_values() {
        let mut config = AppConfig::default();
        config.defaults.workers = 3;
        run_args(&["-i", "in.json", "-o", "out.json"]).apply(&mut config);

        assert_eq!(config.defaults.workers, 3);
        assert!(config.defaults.headless);
        assert!(config.output.resume);
        assert_eq!(config.lookup.providers, vec!["registry", "network"]);
    }

    #[test]
    fn flags_override_config() {
        let mut config = AppConfig::default();
        run_args(&[
            "-i", "in.csv", "-o", "out.csv",
            "--workers", "4",
            "--batch-size", "10",
            "--no-headless",
            "--format", "table",
            "--no-resume",
            "--providers", "registry,directory",
        ])
        .apply(&mut config);

        assert_eq!(config.defaults.workers, 4);
        assert_eq!(config.defaults.batch_size, 10);
        assert!(!config.defaults.headless);
        assert_eq!(config.defaults.output_format, OutputFormat::Table);
        assert!(!config.output.resume);
        assert_eq!(config.lookup.providers, vec!["registry", "directory"]);
    }

    #[test]
    fn xlsx_format_flag() {
        let mut config = AppConfig::default();
        run_args(&["-i", "in.json", "-o", "out.xlsx", "--format", "xlsx"]).apply(&mut config);
        assert_eq!(config.defaults.output_format, OutputFormat::Xlsx);
    }

    #[test]
    fn last_headless_flag_wins() {
        let args = run_args(&["-i", "a", "-o", "b", "--no-headless", "--headless"]);
        assert!(args.headless);
        assert!(!args.no_headless);
    }
}
