//! CLI application for invoice extraction and storage.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{batch, config, invoices, process, GlobalOpts};

/// Invoice extraction - turn PDF invoices into stored, tax-aware records
#[derive(Parser)]
#[command(name = "invex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a single invoice PDF
    Process(process::ProcessArgs),

    /// Process every PDF matching a glob pattern
    Batch(batch::BatchArgs),

    /// List stored invoices
    List(invoices::ListArgs),

    /// Show one stored invoice with per-item tax
    Show(invoices::ShowArgs),

    /// Delete a stored invoice
    Delete(invoices::DeleteArgs),

    /// Find stored invoices containing a category
    Search(invoices::SearchArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false);

    // RUST_LOG, when set, takes precedence over -v.
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = builder.with_env_filter(EnvFilter::from_default_env()).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = builder.with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    match cli.command {
        Commands::Process(args) => process::run(args, &cli.global).await,
        Commands::Batch(args) => batch::run(args, &cli.global).await,
        Commands::List(args) => invoices::list(args, &cli.global).await,
        Commands::Show(args) => invoices::show(args, &cli.global).await,
        Commands::Delete(args) => invoices::delete(args, &cli.global).await,
        Commands::Search(args) => invoices::search(args, &cli.global).await,
        Commands::Config(args) => config::run(args, &cli.global).await,
    }
}
