//! Process command - extract, price and store a single invoice file.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use invex_core::{FileOutcome, Pipeline, UploadedFile};

use super::{format_record_text, GlobalOpts, OutputFormat};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Write the stored record to this file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Oracle API key (default: read from the configured environment variable)
    #[arg(long)]
    api_key: Option<String>,
}

pub async fn run(args: ProcessArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let start = Instant::now();

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let (config, session) = global.open_session()?;
    let pipeline = Pipeline::from_config(&config, args.api_key.clone())?;
    let upload = UploadedFile::from_path(&args.input)?;

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(format!("Processing {}...", upload.name));
    pb.enable_steady_tick(Duration::from_millis(100));

    let outcome = pipeline.process_single(&session, upload).await;
    pb.finish_and_clear();

    match outcome {
        FileOutcome::Done(done) => {
            let output = match args.format {
                OutputFormat::Json => serde_json::to_string_pretty(&done.record)?,
                OutputFormat::Text => format_record_text(&done.record, session.tax_table()),
            };

            if let Some(output_path) = &args.output {
                fs::write(output_path, &output)?;
                println!(
                    "{} Output written to {}",
                    style("✓").green(),
                    output_path.display()
                );
            } else {
                println!("{}", output);
            }

            eprintln!(
                "{} Stored {} in {}",
                style("✓").green(),
                done.record.filename(),
                session.store().await.path().display()
            );
        }
        FileOutcome::Skipped(skipped) => {
            println!(
                "{} Skipped {}: {}",
                style("ℹ").blue(),
                skipped.filename,
                skipped.reason
            );
        }
        FileOutcome::Failed(failed) => {
            anyhow::bail!(
                "{} failed while {} ({}): {}",
                failed.filename,
                failed.stage,
                failed.kind,
                failed.message
            );
        }
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}
