//! Commands over the invoice store: list, show, delete and search.

use clap::Args;
use console::style;

use invex_core::InvoiceRecord;

use super::{format_record_text, GlobalOpts, OutputFormat};

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Arguments for the show command.
#[derive(Args)]
pub struct ShowArgs {
    /// Invoice id (or file name with --by-filename)
    #[arg(required = true)]
    key: String,

    /// Look the invoice up by its original file name
    #[arg(long)]
    by_filename: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Arguments for the delete command.
#[derive(Args)]
pub struct DeleteArgs {
    /// Invoice id (or file name with --by-filename)
    #[arg(required = true)]
    key: String,

    /// Delete by original file name
    #[arg(long)]
    by_filename: bool,
}

/// Arguments for the search command.
#[derive(Args)]
pub struct SearchArgs {
    /// Category a line item must carry
    #[arg(long, required = true)]
    category: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

pub async fn list(args: ListArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let (_, session) = global.open_session()?;
    let store = session.store().await;
    print_records(store.list_all().iter(), args.format)
}

pub async fn show(args: ShowArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let (_, session) = global.open_session()?;
    let store = session.store().await;

    let record = if args.by_filename {
        store.get_by_filename(&args.key)
    } else {
        store.get(&args.key)
    };
    let Some(record) = record else {
        anyhow::bail!("No stored invoice for '{}'", args.key);
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(record)?),
        OutputFormat::Text => println!("{}", format_record_text(record, session.tax_table())),
    }
    Ok(())
}

pub async fn delete(args: DeleteArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let (_, session) = global.open_session()?;
    let mut store = session.store().await;

    let removed = if args.by_filename {
        store.delete_by_filename(&args.key)?
    } else {
        store.delete(&args.key)?
    };

    if !removed {
        anyhow::bail!("No stored invoice for '{}'", args.key);
    }
    println!("{} Deleted {}", style("✓").green(), args.key);
    Ok(())
}

pub async fn search(args: SearchArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let (_, session) = global.open_session()?;
    let store = session.store().await;
    print_records(store.search_by_category(&args.category).into_iter(), args.format)
}

fn print_records<'a>(
    records: impl Iterator<Item = &'a InvoiceRecord>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let records: Vec<&InvoiceRecord> = records.collect();

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{} No invoices found", style("ℹ").blue());
        return Ok(());
    }

    println!(
        "{:<20} {:<32} {:<17} {:>12} {:>12}",
        "INVOICE", "FILE", "PROCESSED", "TAX", "TOTAL"
    );
    for record in &records {
        println!(
            "{:<20} {:<32} {:<17} {:>12} {:>12}",
            record.invoice_id(),
            record.filename(),
            record
                .processed_at()
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M"),
            record.tax_total().to_string(),
            record.post_tax_total().to_string()
        );
    }
    println!();
    println!("{} invoice(s)", records.len());
    Ok(())
}
