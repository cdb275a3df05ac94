//! Batch processing command for multiple invoice files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::debug;

use invex_core::{BatchReport, FileOutcome, Pipeline};

use super::GlobalOpts;

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern matching input PDFs
    #[arg(required = true)]
    input: String,

    /// Write each stored record as JSON into this directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Oracle API key (default: read from the configured environment variable)
    #[arg(long)]
    api_key: Option<String>,
}

/// One row of the summary CSV.
#[derive(Serialize)]
struct SummaryRow<'a> {
    filename: &'a str,
    status: &'a str,
    invoice_id: &'a str,
    line_items: usize,
    pre_tax_total: String,
    tax_total: String,
    post_tax_total: String,
    prompt_tokens: u64,
    completion_tokens: u64,
    stage: String,
    error_kind: String,
    message: &'a str,
}

pub async fn run(args: BatchArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let start = Instant::now();

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    let (config, session) = global.open_session()?;
    let pipeline = Pipeline::from_config(&config, args.api_key.clone())?;

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("=>-"),
    );

    let report = pipeline
        .process_paths_with(&session, &files, |_, outcome| {
            overall_pb.set_message(outcome.filename().to_string());
            overall_pb.inc(1);
        })
        .await;

    overall_pb.finish_with_message("Complete");

    if let Some(ref output_dir) = args.output_dir {
        for done in &report.processed {
            let stem = Path::new(done.record.filename())
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("invoice");
            let output_path = output_dir.join(format!("{}.json", stem));
            fs::write(&output_path, serde_json::to_string_pretty(&done.record)?)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &report)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let usage = report.usage();
    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        report.total(),
        start.elapsed()
    );
    println!(
        "   {} stored, {} skipped, {} failed",
        style(report.processed.len()).green(),
        style(report.skipped.len()).yellow(),
        style(report.failed.len()).red()
    );
    println!(
        "   {} prompt / {} completion tokens",
        usage.prompt_tokens, usage.completion_tokens
    );

    if !report.skipped.is_empty() {
        println!();
        println!("{}", style("Skipped files:").yellow());
        for skipped in &report.skipped {
            println!("  - {}: {}", skipped.filename, skipped.reason);
        }
    }

    if !report.failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for failed in &report.failed {
            println!(
                "  - {} ({} while {}): {}",
                failed.filename, failed.kind, failed.stage, failed.message
            );
        }
    }

    Ok(())
}

fn summary_row(outcome: &FileOutcome) -> SummaryRow<'_> {
    match outcome {
        FileOutcome::Done(done) => {
            let record = &done.record;
            let usage = record.usage();
            SummaryRow {
                filename: record.filename(),
                status: "stored",
                invoice_id: record.invoice_id(),
                line_items: record.line_items().len(),
                pre_tax_total: record.pre_tax_total().to_string(),
                tax_total: record.tax_total().to_string(),
                post_tax_total: record.post_tax_total().to_string(),
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                stage: String::new(),
                error_kind: String::new(),
                message: "",
            }
        }
        FileOutcome::Skipped(skipped) => SummaryRow {
            filename: &skipped.filename,
            status: "skipped",
            invoice_id: "",
            line_items: 0,
            pre_tax_total: String::new(),
            tax_total: String::new(),
            post_tax_total: String::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            stage: skipped.stage.to_string(),
            error_kind: String::new(),
            message: &skipped.reason,
        },
        FileOutcome::Failed(failed) => SummaryRow {
            filename: &failed.filename,
            status: "failed",
            invoice_id: "",
            line_items: 0,
            pre_tax_total: String::new(),
            tax_total: String::new(),
            post_tax_total: String::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            stage: failed.stage.to_string(),
            error_kind: failed.kind.to_string(),
            message: &failed.message,
        },
    }
}

fn write_summary(path: &Path, report: &BatchReport) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let outcomes = report
        .processed
        .iter()
        .cloned()
        .map(FileOutcome::Done)
        .chain(report.skipped.iter().cloned().map(FileOutcome::Skipped))
        .chain(report.failed.iter().cloned().map(FileOutcome::Failed))
        .collect::<Vec<_>>();

    for outcome in &outcomes {
        wtr.serialize(summary_row(outcome))?;
    }

    wtr.flush()?;
    Ok(())
}
