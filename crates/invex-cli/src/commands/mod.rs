//! CLI subcommands.

pub mod batch;
pub mod config;
pub mod invoices;
pub mod process;

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use tracing::debug;

use invex_core::models::config::InvexConfig;
use invex_core::{InvoiceRecord, Session, TaxTable, TotalsCalculator};

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Invoice store file (overrides the config)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Tax rate file (overrides the config)
    #[arg(long, global = true)]
    pub tax_rates: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

impl GlobalOpts {
    /// Config file in effect: `--config`, else the default location.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config::default_config_path)
    }

    /// Settings from the config file, `None` if it does not exist yet.
    pub fn read_config_file(&self) -> anyhow::Result<Option<InvexConfig>> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(None);
        }
        debug!("Loading config from {}", path.display());
        InvexConfig::from_file(&path)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))
    }

    /// Load the configuration and apply command line overrides.
    pub fn load_config(&self) -> anyhow::Result<InvexConfig> {
        let mut config = match self.read_config_file()? {
            Some(config) => config,
            None if self.config.is_some() => {
                anyhow::bail!("Config file not found: {}", self.config_path().display());
            }
            None => InvexConfig::default(),
        };

        if let Some(store) = &self.store {
            config.store.path = store.clone();
        }
        if let Some(rates) = &self.tax_rates {
            config.tax.rates_path = rates.clone();
        }
        Ok(config)
    }

    /// Open the store and tax table named by the configuration.
    pub fn open_session(&self) -> anyhow::Result<(InvexConfig, Session)> {
        let config = self.load_config()?;
        let session = Session::open(&config)?;
        Ok((config, session))
    }
}

/// Render a record for the terminal, with per-item tax at the current rates.
pub fn format_record_text(record: &InvoiceRecord, tax_table: &TaxTable) -> String {
    let calculator = TotalsCalculator::new(tax_table);
    let mut output = String::new();

    let id = if record.invoice_id().is_empty() {
        "(no invoice id)"
    } else {
        record.invoice_id()
    };
    output.push_str(&format!("Invoice: {}\n", id));
    output.push_str(&format!("File: {}\n", record.filename()));
    output.push_str(&format!(
        "Processed: {}\n",
        record
            .processed_at()
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    ));
    output.push('\n');

    output.push_str("Line items:\n");
    for (i, item) in record.line_items().iter().enumerate() {
        output.push_str(&format!(
            "  {}. {} | {} x {} = {} | {}",
            i + 1,
            item.description,
            item.quantity,
            item.unit_price,
            item.total_price,
            item.category
        ));
        match calculator.item_tax(i, item) {
            Ok(tax) => output.push_str(&format!(
                " @ {}% | tax {} | with tax {}\n",
                tax.rate_percent(),
                tax.tax_rounded(),
                tax.total_with_tax_rounded()
            )),
            Err(e) => output.push_str(&format!(" | tax unavailable: {}\n", e)),
        }
    }
    if record.line_items().is_empty() {
        output.push_str("  (none)\n");
    }
    output.push('\n');

    output.push_str(&format!("Pre-tax:  {}\n", record.pre_tax_total()));
    output.push_str(&format!("Tax:      {}\n", record.tax_total()));
    output.push_str(&format!("Post-tax: {}\n", record.post_tax_total()));

    if !record.special_notes().is_empty() {
        output.push_str("\nNotes:\n");
        for note in record.special_notes() {
            output.push_str(&format!("  - {}\n", note));
        }
    }

    let usage = record.usage();
    output.push_str(&format!(
        "\nTokens: {} prompt / {} completion",
        usage.prompt_tokens, usage.completion_tokens
    ));
    output
}
