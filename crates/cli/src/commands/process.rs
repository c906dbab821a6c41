//! Apply synced adjustments to outlet stock.
//!
//! ```bash
//! os-cli process all
//! os-cli process one ADJ-00042
//! os-cli process many 12 ADJ-00043
//! ```
//!
//! Only `DATABASE_URL`, `LOCATION_MODULE_MAP`, and
//! `PROCESSING_CLAIM_TIMEOUT_SECS` are read; Zoho is not contacted.

use std::sync::Arc;

use outlet_stock_api::config::{SyncConfig, database_url_from_env, location_modules_from_env};
use outlet_stock_api::services::{ProcessResult, ProcessingService};

async fn service() -> Result<ProcessingService, Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let database_url = database_url_from_env()?;
    let modules = location_modules_from_env()?;
    let tuning = SyncConfig::from_env()?;
    let store = Arc::new(super::connect(&database_url).await?);
    Ok(ProcessingService::new(store, modules).with_claim_timeout(tuning.claim_timeout))
}

/// Process every claimable adjustment.
///
/// # Errors
///
/// Returns an error if the store cannot be reached.
pub async fn all() -> Result<(), Box<dyn std::error::Error>> {
    let report = service().await?.process_all_synced().await?;
    super::print_json(&report)?;
    Ok(())
}

/// Process one adjustment.
///
/// # Errors
///
/// Returns an error if the adjustment does not exist or processing fails.
pub async fn one(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = service().await?.process(id).await?;
    super::print_json(&outcome)?;

    match outcome.result {
        ProcessResult::Processed | ProcessResult::Skipped => Ok(()),
        ProcessResult::Failed => Err(format!(
            "adjustment {} failed: {}",
            outcome.adjustment_number,
            outcome.message.as_deref().unwrap_or("unknown error")
        )
        .into()),
        ProcessResult::NotClaimable => Err(format!(
            "adjustment {} is not claimable (processing status: {})",
            outcome.adjustment_number, outcome.processing_status
        )
        .into()),
    }
}

/// Process several adjustments in order.
///
/// # Errors
///
/// Returns an error if the store cannot be reached.
pub async fn many(ids: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let report = service().await?.process_many(ids).await;
    super::print_json(&report)?;
    Ok(())
}
