//! One-shot Zoho sync.
//!
//! ```bash
//! os-cli sync            # pull only
//! os-cli sync --process  # pull, then apply to outlet stock
//! ```
//!
//! Needs the same environment as the API server. The report is printed as
//! JSON; per-record failures do not change the exit code.

use std::sync::Arc;

use outlet_stock_api::config::ApiConfig;
use outlet_stock_api::services::{ProcessingService, SyncOptions, SyncService};
use outlet_stock_api::zoho::ZohoClient;

/// Run one sync.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the database is unreachable,
/// or the Zoho list call fails.
pub async fn run(process: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = ApiConfig::from_env()?;
    let store = Arc::new(super::connect(&config.database_url).await?);
    let zoho = ZohoClient::new(&config.zoho)?;

    let processing = ProcessingService::new(store.clone(), config.location_modules.clone())
        .with_claim_timeout(config.sync.claim_timeout);
    let sync = SyncService::new(Arc::new(zoho), store, processing, config.sync.clone());

    let options = SyncOptions {
        process: Some(process || config.sync.process_after_sync),
    };
    let report = sync.run(options).await?;

    tracing::info!(
        fetched = report.fetched,
        created = report.created,
        updated = report.updated,
        failed = report.failed,
        "Sync finished"
    );
    super::print_json(&report)?;
    Ok(())
}
