//! CLI entry point for the survey income tool.
//!
//! Provides subcommands for summarizing weighted income distributions across
//! survey extracts and for checking whether a single extract is usable.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use survey_income::analyzers::analyzer::{run, run_concurrent};
use survey_income::category::Dimension;
use survey_income::config::PipelineConfig;
use survey_income::deflator::{DeflatorBase, DeflatorKey};
use survey_income::loader::read_extract_file;
use survey_income::output::{print_json, print_pretty, write_outputs};
use survey_income::record::PeriodGranularity;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "survey_income")]
#[command(about = "Weighted income statistics from household survey extracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize nominal and real income by domain, period and category
    Summarize {
        /// Extract files or directories of extracts
        #[arg(value_name = "SOURCE", required = true)]
        sources: Vec<PathBuf>,

        /// JSON config file; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory to write tables and the run report to
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,

        /// Only keep respondents at least this old
        #[arg(long)]
        min_age: Option<i32>,

        /// Breakdown dimensions, comma separated (sex, education, age_band, occupation)
        #[arg(long, value_delimiter = ',')]
        by: Option<Vec<Dimension>>,

        /// Group periods by `year` or `quarter`
        #[arg(long, value_parser = parse_granularity)]
        granularity: Option<PeriodGranularity>,

        /// Maximum number of extracts read at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Read extracts one at a time on the current thread
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Price index CSV (year[,quarter],index)
        #[arg(long)]
        deflator: Option<PathBuf>,

        /// Express real income in prices of this year
        #[arg(long, conflicts_with_all = ["base_value", "latest_base"])]
        base_year: Option<i32>,

        /// Quarter of --base-year, for quarterly index tables
        #[arg(long, requires = "base_year")]
        base_quarter: Option<u8>,

        /// Fixed base index value
        #[arg(long, conflicts_with = "latest_base")]
        base_value: Option<f64>,

        /// Use the most recent index entry as the base
        #[arg(long, default_value_t = false)]
        latest_base: bool,

        /// Skip labor-force rates
        #[arg(long, default_value_t = false)]
        no_labor: bool,

        /// Gzip compress the CSV tables
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Check whether one extract would be accepted
    Inspect {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// JSON config file; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn parse_granularity(s: &str) -> std::result::Result<PeriodGranularity, String> {
    match s {
        "year" => Ok(PeriodGranularity::Year),
        "quarter" => Ok(PeriodGranularity::Quarter),
        other => Err(format!("unknown granularity '{other}' (expected year or quarter)")),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load(p)
            .with_context(|| format!("failed to load config from {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/survey_income.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("survey_income.log"));
    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Summarize {
            sources,
            config,
            out_dir,
            min_age,
            by,
            granularity,
            concurrency,
            sequential,
            deflator,
            base_year,
            base_quarter,
            base_value,
            latest_base,
            no_labor,
            gzip,
        } => {
            let mut config = load_config(config.as_deref())?;

            if min_age.is_some() {
                config.min_age = min_age;
            }
            if let Some(by) = by {
                config.breakdowns = by;
            }
            if let Some(granularity) = granularity {
                config.granularity = granularity;
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if deflator.is_some() {
                config.deflator.index_file = deflator;
            }
            if let Some(year) = base_year {
                let key = match base_quarter {
                    Some(q) => DeflatorKey::quarterly(year, q),
                    None => DeflatorKey::annual(year),
                };
                config.deflator.base = DeflatorBase::Period(key);
            } else if let Some(value) = base_value {
                config.deflator.base = DeflatorBase::Fixed(value);
            } else if latest_base {
                config.deflator.base = DeflatorBase::Latest;
            }
            if no_labor {
                config.labor_rates = false;
            }
            config.validate()?;

            info!(
                sources = sources.len(),
                granularity = ?config.granularity,
                breakdowns = ?config.breakdowns,
                min_age = ?config.min_age,
                "Starting summary run"
            );

            let output = if sequential {
                run(&sources, &config)?
            } else {
                run_concurrent(&sources, &config).await?
            };

            for table in &output.tables {
                print_pretty(table);
            }
            print_json(&output.report)?;

            let written = write_outputs(&out_dir, &output, gzip)
                .with_context(|| format!("failed to write outputs to {}", out_dir.display()))?;
            for path in &written {
                info!(path = %path.display(), "Wrote");
            }
        }
        Commands::Inspect { source, config } => {
            let config = load_config(config.as_deref())?;
            let format = config.extract_format()?;

            match read_extract_file(
                &source,
                &config.schema,
                &format,
                &config.required_covariates(),
            ) {
                Ok(extract) => {
                    let s = extract.summary;
                    info!(
                        source = %s.source,
                        rows = s.rows,
                        records = s.records,
                        rows_without_key = s.rows_without_key,
                        income_missing = s.income_missing,
                        weight_column = %s.weight_column,
                        "Source accepted"
                    );
                }
                Err(rejection) => {
                    warn!("{}", rejection);
                    anyhow::bail!("source rejected: {}", rejection);
                }
            }
        }
    }

    Ok(())
}
