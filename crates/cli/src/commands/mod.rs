//! Subcommand implementations.

pub mod migrate;
pub mod process;
pub mod seed;
pub mod sync;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use outlet_stock_api::config::MEMORY_DATABASE_URL;
use outlet_stock_api::db::{self, PgStore};

/// Connect to `PostgreSQL`. The in-memory store is rejected since nothing
/// would outlive the command.
async fn connect(database_url: &SecretString) -> Result<PgStore, Box<dyn std::error::Error>> {
    if database_url.expose_secret() == MEMORY_DATABASE_URL {
        return Err("CLI commands need a PostgreSQL DATABASE_URL, not memory://".into());
    }
    let pool = db::create_pool(database_url).await?;
    tracing::info!("Connected to database");
    Ok(PgStore::new(pool))
}

/// Print a report as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    let json = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(())
}
