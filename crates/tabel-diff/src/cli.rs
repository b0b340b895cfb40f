//! Command-line front end over the worker pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::Serialize;

use crate::worker::{run_compare, CancelToken, CompareEvent, CompareOptions, CompareSummary};

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    about = "Compare two timesheet workbooks, highlight differing day cells in place, and build a categorized report."
)]
pub struct Args {
    /// Base (reference) workbook. Annotated in place; the report lands
    /// beside it.
    base: PathBuf,

    /// Comparison workbook. Annotated in place.
    compare: PathBuf,

    /// Reporting month used to format difference dates (1-12).
    #[arg(long, default_value_t = 1)]
    month: u32,

    /// Reporting year used to format difference dates.
    #[arg(long, default_value_t = 2025)]
    year: i32,

    /// Output format for the final summary.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct JsonSummary<'a> {
    report: &'a str,
    vv: usize,
    dp: usize,
    other: usize,
    missing: usize,
}

/// Run the comparison; returns the process exit code.
pub fn run(args: Args) -> Result<u8> {
    let options = CompareOptions {
        base_path: args.base,
        compare_path: args.compare,
        month: args.month,
        year: args.year,
    };

    // Progress and log messages go to stderr so stdout stays parseable.
    let mut sink = |event: CompareEvent| {
        if let CompareEvent::Message(text) = event {
            eprintln!("{text}");
        }
    };

    match run_compare(&options, &mut sink, &CancelToken::new()) {
        Ok(summary) => {
            print_summary(&summary, &args.format)?;
            Ok(0)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(1)
        }
    }
}

fn print_summary(summary: &CompareSummary, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Отчет: {}", summary.output_path.display());
            println!("ВВ: {}", summary.vv);
            println!("ДП: {}", summary.dp);
            println!("Остальные: {}", summary.other);
            println!("Отсутствующие: {}", summary.missing);
        }
        OutputFormat::Json => {
            let report = summary.output_path.display().to_string();
            let json = JsonSummary {
                report: &report,
                vv: summary.vv,
                dp: summary.dp,
                other: summary.other,
                missing: summary.missing,
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}
