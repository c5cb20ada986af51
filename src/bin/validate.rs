use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use bpa::logging::{init_logging, LogConfig, LogFormat};
use bpa::prelude::*;
use bpa::report;

#[derive(Parser)]
#[command(name = "bpa-validate")]
#[command(version, about = "Validate a BPA-I submission file against the fixed-width layout", long_about = None)]
struct Cli {
    /// Submission file to validate
    file: PathBuf,
    /// Write an HTML report
    #[arg(short, long)]
    report: bool,
    /// HTML report path (default: <input>_validation.html); implies --report
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Print the full report as JSON on stdout
    #[arg(long)]
    json: bool,
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

const EXIT_CONFORMANT: u8 = 0;
const EXIT_INVALID: u8 = 1;
const EXIT_UNREADABLE: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_config = LogConfig::from_verbosity(cli.verbose)
        .with_format(cli.log_format)
        .with_timestamps(cli.log_timestamps);
    if let Err(e) = init_logging(&log_config) {
        eprintln!("{}", e);
    }

    let report = match ConformanceValidator::new().validate_file(&cli.file) {
        Ok(report) => report,
        Err(e) => {
            error!(file = %cli.file.display(), "cannot read file");
            eprintln!("{}", e.user_message());
            return ExitCode::from(EXIT_UNREADABLE);
        }
    };

    if cli.json {
        match report::to_json(&report, true) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", e.user_message()),
        }
    } else {
        report.print_summary();
    }

    if cli.report || cli.output.is_some() {
        let path = cli
            .output
            .clone()
            .unwrap_or_else(|| report::default_report_path(&cli.file));
        match report::write_html(&report, &path) {
            Ok(()) => {
                if !cli.json {
                    println!("HTML report written to {}", path.display());
                }
            }
            Err(e) => eprintln!("{}", e.user_message()),
        }
    }

    if report.is_conformant() {
        ExitCode::from(EXIT_CONFORMANT)
    } else {
        ExitCode::from(EXIT_INVALID)
    }
}
