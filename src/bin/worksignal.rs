//! Worksignal CLI - Command-line interface for Worksignal
//!
//! Commands:
//! - analyze: Run the full analysis and write a report envelope
//! - validate: Validate raw samples and productivity records
//! - config: Print the effective configuration as TOML

use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use worksignal::schema::{
    Parsed, RawBiometricSample, RawProductivityRecord, RecordAdapter, ValidationResult,
};
use worksignal::{AnalysisConfig, AnalysisPipeline, ReportEncoder, SCHEMA_VERSION, WORKSIGNAL_VERSION};

/// Worksignal - stress and activity analytics against site productivity
#[derive(Parser)]
#[command(name = "worksignal")]
#[command(version = WORKSIGNAL_VERSION)]
#[command(about = "Relate team stress and activity to site productivity", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis
    Analyze {
        /// Biometric samples file (use - for stdin)
        #[arg(short, long)]
        samples: PathBuf,

        /// Monthly productivity records file
        #[arg(short, long)]
        productivity: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured timezone (IANA format, e.g., "Europe/London")
        #[arg(long)]
        timezone: Option<String>,

        /// Input format of both input files
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Validate raw input records
    Validate {
        /// Biometric samples file (use - for stdin)
        #[arg(short, long)]
        samples: Option<PathBuf>,

        /// Monthly productivity records file
        #[arg(short, long)]
        productivity: Option<PathBuf>,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// TOML configuration file to load and validate
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Single-line JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("worksignal=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), WorksignalCliError> {
    match cli.command {
        Commands::Analyze {
            samples,
            productivity,
            output,
            config,
            timezone,
            input_format,
            output_format,
        } => cmd_analyze(
            &samples,
            &productivity,
            &output,
            config.as_deref(),
            timezone,
            &input_format,
            &output_format,
        ),
        Commands::Validate {
            samples,
            productivity,
            input_format,
            json,
        } => cmd_validate(samples.as_deref(), productivity.as_deref(), &input_format, json),
        Commands::Config { config } => cmd_config(config.as_deref()),
    }
}

fn cmd_analyze(
    samples_path: &Path,
    productivity_path: &Path,
    output: &Path,
    config_path: Option<&Path>,
    timezone: Option<String>,
    input_format: &InputFormat,
    output_format: &OutputFormat,
) -> Result<(), WorksignalCliError> {
    let mut config = load_config(config_path)?;
    if let Some(tz) = timezone {
        config.timezone = tz;
    }
    let pipeline = AnalysisPipeline::new(config)?;

    let samples = parse_records::<RawBiometricSample>(&read_input(samples_path)?, input_format)?;
    let records = parse_records::<RawProductivityRecord>(&read_input(productivity_path)?, input_format)?;
    let report = pipeline.run(&samples, &records)?;

    let encoder = ReportEncoder::new();
    let envelope = encoder.encode(pipeline.config(), report);
    let output_data = match output_format {
        OutputFormat::Json => serde_json::to_string(&envelope)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&envelope)?,
    };

    if output.to_string_lossy() == "-" {
        println!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn cmd_validate(
    samples_path: Option<&Path>,
    productivity_path: Option<&Path>,
    input_format: &InputFormat,
    json: bool,
) -> Result<(), WorksignalCliError> {
    if samples_path.is_none() && productivity_path.is_none() {
        return Err(WorksignalCliError::NoInput);
    }

    let mut sections = Vec::new();

    if let Some(path) = samples_path {
        let parsed = parse_records::<RawBiometricSample>(&read_input(path)?, input_format)?;
        let validated =
            RecordAdapter::validate_samples(parsed.indexed()).with_parse_rejections(&parsed.rejected);
        sections.push(ValidationSection::new("samples", parsed.received(), &validated.rejected));
    }

    if let Some(path) = productivity_path {
        let parsed = parse_records::<RawProductivityRecord>(&read_input(path)?, input_format)?;
        let validated = RecordAdapter::validate_productivity(parsed.indexed())
            .with_parse_rejections(&parsed.rejected);
        sections.push(ValidationSection::new(
            "productivity",
            parsed.received(),
            &validated.rejected,
        ));
    }

    let report = ValidationReport {
        schema_version: SCHEMA_VERSION.to_string(),
        sections,
    };
    let invalid: usize = report.sections.iter().map(|s| s.invalid_records).sum();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report ({})", report.schema_version);
        println!("=================");
        for section in &report.sections {
            println!("\n[{}]", section.input);
            println!("Total records:   {}", section.total_records);
            println!("Valid records:   {}", section.valid_records);
            println!("Invalid records: {}", section.invalid_records);
            if !section.errors.is_empty() {
                println!("\nErrors:");
                for err in &section.errors {
                    println!("  - index {}: {}", err.index, err.error);
                }
            }
        }
    }

    if invalid > 0 {
        Err(WorksignalCliError::ValidationFailed(invalid))
    } else {
        Ok(())
    }
}

fn cmd_config(config_path: Option<&Path>) -> Result<(), WorksignalCliError> {
    let config = load_config(config_path)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, WorksignalCliError> {
    match path {
        Some(path) => Ok(AnalysisConfig::load(path)?),
        None => Ok(AnalysisConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String, WorksignalCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn parse_records<T: DeserializeOwned>(data: &str, format: &InputFormat) -> Result<Parsed<T>, WorksignalCliError> {
    match format {
        InputFormat::Ndjson => Ok(RecordAdapter::parse_ndjson(data)),
        InputFormat::Json => Ok(RecordAdapter::parse_array(data)?),
    }
}

// Error types

#[derive(Debug)]
enum WorksignalCliError {
    Io(io::Error),
    Analysis(worksignal::AnalysisError),
    Json(serde_json::Error),
    NoInput,
    ValidationFailed(usize),
}

impl From<io::Error> for WorksignalCliError {
    fn from(e: io::Error) -> Self {
        WorksignalCliError::Io(e)
    }
}

impl From<worksignal::AnalysisError> for WorksignalCliError {
    fn from(e: worksignal::AnalysisError) -> Self {
        WorksignalCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for WorksignalCliError {
    fn from(e: serde_json::Error) -> Self {
        WorksignalCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<WorksignalCliError> for CliError {
    fn from(e: WorksignalCliError) -> Self {
        use worksignal::AnalysisError;
        match e {
            WorksignalCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            WorksignalCliError::Analysis(e @ (AnalysisError::InvalidConfig(_)
            | AnalysisError::InvalidTimezone(_)
            | AnalysisError::TomlError(_))) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'worksignal config' to see the expected layout".to_string()),
            },
            WorksignalCliError::Analysis(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches {} schema", SCHEMA_VERSION)),
            },
            WorksignalCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            WorksignalCliError::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "No input files given".to_string(),
                hint: Some("Pass --samples and/or --productivity".to_string()),
            },
            WorksignalCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    schema_version: String,
    sections: Vec<ValidationSection>,
}

#[derive(serde::Serialize)]
struct ValidationSection {
    input: String,
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

impl ValidationSection {
    fn new(input: &str, total: usize, rejected: &[ValidationResult]) -> Self {
        Self {
            input: input.to_string(),
            total_records: total,
            valid_records: total - rejected.len(),
            invalid_records: rejected.len(),
            errors: rejected
                .iter()
                .map(|r| ValidationErrorDetail {
                    index: r.index,
                    error: r.error.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}
