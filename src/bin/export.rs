use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use bpa::export::exporter_for;
use bpa::logging::{init_logging, LogConfig, LogFormat};
use bpa::prelude::*;

#[derive(Parser)]
#[command(name = "bpa-export")]
#[command(version, about = "Build a BPA-I submission file from encounter rows", long_about = None)]
struct Cli {
    /// CSV file of encounter rows
    #[arg(short, long)]
    input: PathBuf,
    /// Competence month as AAAAMM (default: current month)
    #[arg(short, long)]
    competence: Option<String>,
    /// Output path without extension; the competence month is appended
    #[arg(short, long, default_value = "PAAPAE")]
    output: PathBuf,
    /// Configuration file (default: user config, then BPA_* variables)
    #[arg(long, env = "BPA_CONFIG")]
    config: Option<PathBuf>,
    /// Mapping table file overlaid on the built-in tables
    #[arg(long)]
    mappings: Option<PathBuf>,
    /// Deduplication policy: none, aggregate-full, aggregate-narrow,
    /// first-per-patient-provider-day, first-per-source-row
    #[arg(long)]
    dedup: Option<String>,
    /// Input field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,
    /// Read the input as Latin-1 instead of UTF-8
    #[arg(long)]
    latin1: bool,
    /// Skip malformed input rows instead of failing
    #[arg(long)]
    skip_invalid: bool,
    /// Write the unmapped procedure codes to this file
    #[arg(long)]
    missing_log: Option<PathBuf>,
    /// Also write the canonical records as JSON
    #[arg(long)]
    json: Option<PathBuf>,
    /// Also write the canonical records as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Log output format: pretty, compact or json
    #[arg(long, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
    /// Include timestamps in log output
    #[arg(long)]
    log_timestamps: bool,
}

fn main() {
    let cli = Cli::parse();
    let log_config = LogConfig::from_verbosity(cli.verbose)
        .with_format(cli.log_format)
        .with_timestamps(cli.log_timestamps);
    if let Err(e) = init_logging(&log_config) {
        eprintln!("{}", e);
    }

    if let Err(e) = run(cli) {
        match e.downcast_ref::<BpaError>() {
            Some(bpa_error) => eprintln!("Error: {}", bpa_error.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let base_config = match &cli.config {
        Some(path) => ExportConfig::from_file(path)?,
        None => ExportConfig::load(),
    };

    let mut builder = ConfigBuilder::from_config(base_config);
    if let Some(policy) = &cli.dedup {
        builder = builder.dedup_policy(policy.parse::<DedupPolicy>()?);
    }
    if let Some(path) = &cli.mappings {
        builder = builder.mapping_table(path);
    }
    if let Some(path) = &cli.missing_log {
        builder = builder.missing_mappings_log(path);
    }
    let config = builder.build();

    let competence = match &cli.competence {
        Some(code) => Competence::parse(code)?,
        None => Competence::current(),
    };

    if !cli.delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character");
    }

    let tables = load_mapping_tables(&config)?;
    let context = PipelineContext::new(&config, competence, &tables)?;

    let reader = EncounterReader::new()
        .with_delimiter(cli.delimiter as u8)
        .with_latin1_input(cli.latin1)
        .with_skip_invalid_records(cli.skip_invalid);
    #[cfg(feature = "progress")]
    let reader = reader.with_progress_bar(config.enable_progress_bar);
    let rows = reader
        .load(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;

    let outcome = run_export(&context, &rows, &cli.output)?;

    for (path, format) in [(&cli.json, ExportFormat::Json), (&cli.csv, ExportFormat::Csv)] {
        if let Some(path) = path {
            exporter_for(format)?.export(&outcome.batch.records, path)?;
        }
    }

    let header = &outcome.batch.header;
    println!("Submission file: {}", outcome.output_path.display());
    println!("Competence: {}", header.competence);
    println!("Records: {}  Pages: {}  Control: {}", header.line_count, header.page_count, header.checksum);
    if !outcome.batch.missing_mappings.is_empty() {
        match &outcome.missing_log_path {
            Some(path) => println!(
                "Unmapped procedure codes: {} (see {})",
                outcome.batch.missing_mappings.len(),
                path.display()
            ),
            None => println!("Unmapped procedure codes: {}", outcome.batch.missing_mappings.len()),
        }
    }
    info!(defaulted_fields = outcome.batch.field_defaults.len(), "done");
    Ok(())
}
