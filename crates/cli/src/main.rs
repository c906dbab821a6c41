//! Outlet Stock CLI - Migrations, one-shot syncs, and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! os-cli migrate
//!
//! # Pull adjustments from Zoho, then apply them to outlet stock
//! os-cli sync --process
//!
//! # Apply adjustments
//! os-cli process all
//! os-cli process one ADJ-00042
//! os-cli process many 12 ADJ-00043 4600000012345
//!
//! # Load outlet stock from YAML
//! os-cli seed crates/cli/seeds/outlet_stock.example.yaml
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "os-cli")]
#[command(author, version, about = "Outlet Stock CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Pull inventory adjustments from Zoho once
    Sync {
        /// Apply synced adjustments to outlet stock afterwards
        #[arg(long)]
        process: bool,
    },
    /// Apply synced adjustments to outlet stock
    Process {
        #[command(subcommand)]
        target: ProcessTarget,
    },
    /// Upsert outlet stock items from a YAML file
    Seed {
        /// Path to the YAML file
        file: String,
    },
}

#[derive(Subcommand)]
enum ProcessTarget {
    /// Every synced adjustment that is pending or failed
    All,
    /// One adjustment by local id, Zoho id, or adjustment number
    One { id: String },
    /// Several adjustments
    Many {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outlet_stock_cli=info,outlet_stock_api=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Sync { process } => commands::sync::run(process).await?,
        Commands::Process { target } => match target {
            ProcessTarget::All => commands::process::all().await?,
            ProcessTarget::One { id } => commands::process::one(&id).await?,
            ProcessTarget::Many { ids } => commands::process::many(&ids).await?,
        },
        Commands::Seed { file } => commands::seed::outlet_stock(&file).await?,
    }
    Ok(())
}
