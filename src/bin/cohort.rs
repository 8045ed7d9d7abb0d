//! Cohort CLI - Command-line interface for Synheart Cohort
//!
//! Commands:
//! - build: Derive all feature tables from a stacked cohort export
//! - summary: Print run counters without writing tables
//! - config: Print the default engine configuration

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use synheart_cohort::window::{metric_by_name, Metric};
use synheart_cohort::{
    ActivityMetric, Dataset, DatasetSummary, EngineConfig, FeatureEngine, SleepMetric,
    COHORT_VERSION, PRODUCER_NAME,
};

/// Cohort - Feature tables from wearable cohort exports
#[derive(Parser)]
#[command(name = "cohort")]
#[command(author = "Synheart AI Inc")]
#[command(version = COHORT_VERSION)]
#[command(about = "Derive per-user sleep and activity feature tables", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive all feature tables from a stacked cohort export
    Build {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the table files (use - for stdout)
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        format: OutputFormat,

        /// Engine configuration file (.json or .toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Build users on a worker pool
        #[arg(long)]
        parallel: bool,

        /// Worker count for --parallel
        #[arg(long)]
        threads: Option<usize>,

        /// Sleep metrics for a period-over-period table (comma separated)
        #[arg(long, value_delimiter = ',')]
        sleep_pop: Vec<String>,

        /// Activity metrics for a period-over-period table (comma separated)
        #[arg(long, value_delimiter = ',')]
        activity_pop: Vec<String>,
    },

    /// Print run counters as JSON without writing tables
    Summary {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Engine configuration file (.json or .toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Build users on a worker pool
        #[arg(long)]
        parallel: bool,
    },

    /// Print the default engine configuration
    Config {
        /// Configuration format
        #[arg(long, default_value = "toml")]
        format: ConfigFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// JSON array of rows
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

impl OutputFormat {
    fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Ndjson => "ndjson",
            OutputFormat::Json | OutputFormat::JsonPretty => "json",
        }
    }
}

#[derive(Clone, ValueEnum)]
enum ConfigFormat {
    Json,
    Toml,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), CohortCliError> {
    match cli.command {
        Commands::Build {
            input,
            output_dir,
            format,
            config,
            parallel,
            threads,
            sleep_pop,
            activity_pop,
        } => {
            let config = engine_config(config.as_deref(), parallel, threads)?;
            let sleep_pop = parse_metrics(&SleepMetric::ALL, &sleep_pop)?;
            let activity_pop = parse_metrics(&ActivityMetric::ALL, &activity_pop)?;
            cmd_build(&input, &output_dir, format, config, &sleep_pop, &activity_pop)
        }

        Commands::Summary {
            input,
            config,
            parallel,
        } => {
            let config = engine_config(config.as_deref(), parallel, None)?;
            cmd_summary(&input, config)
        }

        Commands::Config { format, output } => cmd_config(format, output.as_deref()),
    }
}

fn engine_config(
    path: Option<&Path>,
    parallel: bool,
    threads: Option<usize>,
) -> Result<EngineConfig, CohortCliError> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.parallel |= parallel;
    if threads.is_some() {
        config.num_threads = threads;
    }
    Ok(config)
}

fn parse_metrics<M: Metric>(all: &[M], names: &[String]) -> Result<Vec<M>, CohortCliError> {
    names
        .iter()
        .map(|name| {
            metric_by_name(all, name.trim())
                .ok_or_else(|| CohortCliError::UnknownMetric(name.clone()))
        })
        .collect()
}

fn read_input(input: &Path) -> Result<String, CohortCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn build_dataset(input: &Path, config: EngineConfig) -> Result<Dataset, CohortCliError> {
    let input_data = read_input(input)?;
    let engine = FeatureEngine::new(config)?;
    let dataset = engine.run(&input_data)?;

    if dataset.summary.documents_decoded == 0 {
        return Err(CohortCliError::NoDocuments);
    }
    Ok(dataset)
}

fn cmd_build(
    input: &Path,
    output_dir: &Path,
    format: OutputFormat,
    config: EngineConfig,
    sleep_pop: &[SleepMetric],
    activity_pop: &[ActivityMetric],
) -> Result<(), CohortCliError> {
    let features = config.features.clone();
    let dataset = build_dataset(input, config)?;

    let mut tables: Vec<(&str, String)> = vec![
        ("users", format_output(&dataset.users.values().collect::<Vec<_>>(), &format)?),
        ("sleep", format_output(&dataset.sleep.values().collect::<Vec<_>>(), &format)?),
        (
            "activity",
            format_output(&dataset.activity.values().collect::<Vec<_>>(), &format)?,
        ),
        (
            "readiness",
            format_output(&dataset.readiness.values().collect::<Vec<_>>(), &format)?,
        ),
        ("experiments", format_output(&dataset.experiments, &format)?),
    ];

    if !sleep_pop.is_empty() {
        let rows = dataset.sleep_period_over_period(
            sleep_pop,
            features.period_offset_days,
            features.zero_prior_cap,
        );
        tables.push(("sleep_pop", format_output(&rows, &format)?));
    }
    if !activity_pop.is_empty() {
        let rows = dataset.activity_period_over_period(
            activity_pop,
            features.period_offset_days,
            features.zero_prior_cap,
        );
        tables.push(("activity_pop", format_output(&rows, &format)?));
    }

    if output_dir.to_string_lossy() == "-" {
        for (_, data) in &tables {
            print!("{}", data);
        }
    } else {
        fs::create_dir_all(output_dir)?;
        for (name, data) in &tables {
            let path = output_dir.join(format!("{}.{}", name, format.extension()));
            fs::write(&path, data)?;
            tracing::info!(table = *name, path = %path.display(), "wrote table");
        }
        let summary = summary_report(&dataset.summary);
        fs::write(
            output_dir.join("summary.json"),
            serde_json::to_string_pretty(&summary)?,
        )?;
    }

    Ok(())
}

fn cmd_summary(input: &Path, config: EngineConfig) -> Result<(), CohortCliError> {
    let dataset = build_dataset(input, config)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&summary_report(&dataset.summary))?
    );
    Ok(())
}

fn cmd_config(format: ConfigFormat, output: Option<&Path>) -> Result<(), CohortCliError> {
    let config = EngineConfig::default();
    let text = match format {
        ConfigFormat::Json => config.to_json()?,
        ConfigFormat::Toml => config.to_toml()?,
    };

    match output {
        Some(path) => fs::write(path, text)?,
        None => println!("{}", text),
    }
    Ok(())
}

fn format_output<T: Serialize>(
    rows: &[T],
    format: &OutputFormat,
) -> Result<String, CohortCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for row in rows {
                out.push_str(&serde_json::to_string(row)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(rows)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(rows)? + "\n"),
    }
}

fn summary_report(summary: &DatasetSummary) -> SummaryReport<'_> {
    SummaryReport {
        producer: PRODUCER_NAME,
        version: COHORT_VERSION,
        summary,
    }
}

// Report types

#[derive(Serialize)]
struct SummaryReport<'a> {
    producer: &'static str,
    version: &'static str,
    #[serde(flatten)]
    summary: &'a DatasetSummary,
}

// Error types

#[derive(Debug)]
enum CohortCliError {
    Io(io::Error),
    Compute(synheart_cohort::ComputeError),
    Json(serde_json::Error),
    UnknownMetric(String),
    NoDocuments,
}

impl From<io::Error> for CohortCliError {
    fn from(e: io::Error) -> Self {
        CohortCliError::Io(e)
    }
}

impl From<synheart_cohort::ComputeError> for CohortCliError {
    fn from(e: synheart_cohort::ComputeError) -> Self {
        CohortCliError::Compute(e)
    }
}

impl From<serde_json::Error> for CohortCliError {
    fn from(e: serde_json::Error) -> Self {
        CohortCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CohortCliError> for CliError {
    fn from(e: CohortCliError) -> Self {
        match e {
            CohortCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CohortCliError::Compute(synheart_cohort::ComputeError::ConfigError(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'cohort config' to see a valid configuration".to_string()),
            },
            CohortCliError::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CohortCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CohortCliError::UnknownMetric(name) => CliError {
                code: "UNKNOWN_METRIC".to_string(),
                message: format!("Unknown metric: {}", name),
                hint: Some("Use column names such as sleep_score, duration or steps".to_string()),
            },
            CohortCliError::NoDocuments => CliError {
                code: "NO_DOCUMENTS".to_string(),
                message: "No user documents found in input".to_string(),
                hint: Some("Ensure the input is a stacked JSON cohort export".to_string()),
            },
        }
    }
}
