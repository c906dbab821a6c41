//! Database migration command.
//!
//! ```bash
//! os-cli migrate
//! ```
//!
//! Reads `DATABASE_URL` and applies `crates/api/migrations/` in order.

use thiserror::Error;

use outlet_stock_api::config::database_url_from_env;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Config(#[from] outlet_stock_api::config::ConfigError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run all pending migrations.
///
/// # Errors
///
/// Returns an error if `DATABASE_URL` is missing, the connection fails, or a
/// migration fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let database_url = database_url_from_env().map_err(MigrationError::from)?;
    let store = super::connect(&database_url).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../api/migrations")
        .run(store.pool())
        .await
        .map_err(MigrationError::from)?;

    tracing::info!("Migrations complete");
    Ok(())
}
