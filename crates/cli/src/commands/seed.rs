//! Seed outlet stock from a YAML file.
//!
//! ```yaml
//! items:
//!   - module: central_kitchen
//!     kind: raw_material
//!     name: Flour
//!     sku: FLOUR-25
//!     zohoItemId: "4600000000101"
//!     quantity: 120
//!     unit: kg
//! ```
//!
//! Rows are upserted, so re-running a file resets the listed quantities.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use outlet_stock_api::config::database_url_from_env;
use outlet_stock_api::db::OutletStockStore;
use outlet_stock_api::models::UpsertStockInput;

/// Top-level shape of a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub items: Vec<UpsertStockInput>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeedError {
    #[error("item {index}: name is empty")]
    EmptyName { index: usize },

    #[error("item {index} ({name}): module is empty")]
    EmptyModule { index: usize, name: String },
}

/// Check every item before anything is written.
#[must_use]
pub fn validate(file: &SeedFile) -> Vec<SeedError> {
    let mut errors = Vec::new();
    for (index, item) in file.items.iter().enumerate() {
        let index = index + 1;
        if item.name.trim().is_empty() {
            errors.push(SeedError::EmptyName { index });
        } else if item.module.as_str().trim().is_empty() {
            errors.push(SeedError::EmptyModule {
                index,
                name: item.name.clone(),
            });
        }
    }
    errors
}

/// Upsert every item in the file.
///
/// # Errors
///
/// Returns an error if the file is missing or invalid, or the database
/// rejects an item.
pub async fn outlet_stock(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading outlet stock seed file");
    let content = tokio::fs::read_to_string(path).await?;
    let file: SeedFile = serde_yaml::from_str(&content)?;

    let errors = validate(&file);
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    let database_url = database_url_from_env()?;
    let store = super::connect(&database_url).await?;

    for item in &file.items {
        let saved = store.upsert_stock(item).await?;
        info!(
            id = %saved.id,
            module = %saved.module,
            name = %saved.name,
            quantity = %saved.quantity,
            "Upserted outlet stock"
        );
    }

    info!(count = file.items.len(), "Seeding complete");
    Ok(())
}
