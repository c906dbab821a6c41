//! Persistence for inventory adjustments and outlet stock.
//!
//! # Tables
//!
//! - `inventory_adjustments` - Zoho adjustments with sync/processing state
//!   (line items as JSONB)
//! - `outlet_stock` - Per-module raw material and finished good quantities
//!
//! # Stores
//!
//! - [`PgStore`] - `PostgreSQL` via sqlx
//! - [`MemoryStore`] - in-process store with the same semantics, used by
//!   tests and when `DATABASE_URL=memory://`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p outlet-stock-cli -- migrate
//! ```

pub mod adjustments;
pub mod memory;
pub mod outlet_stock;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use outlet_stock_core::{AdjustmentId, Module, OutletStockId};

pub use memory::MemoryStore;

use crate::models::{
    AdjustmentFilter, AppliedLine, InventoryAdjustment, NewAdjustment, OutletStockItem,
    StockDelta, StockFilter, SyncFailure, UpsertOutcome, UpsertStockInput,
};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate adjustment number).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Errors applying an adjustment's deltas to outlet stock.
///
/// Nothing is written when any of these is returned.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A line has no matching outlet stock row in its module.
    #[error("line {line}: no outlet stock for {item} in module {module}")]
    StockNotFound {
        line: usize,
        module: Module,
        item: String,
    },

    /// The adjustment is no longer claimed by this caller.
    #[error("adjustment {0} is not in processing state")]
    NotClaimed(AdjustmentId),
}

/// Storage for inventory adjustments.
#[async_trait]
pub trait AdjustmentStore: Send + Sync {
    /// Check that the backing store is reachable.
    async fn health_check(&self) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: AdjustmentId,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError>;

    async fn find_by_zoho_id(
        &self,
        zoho_adjustment_id: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError>;

    async fn find_by_number(
        &self,
        adjustment_number: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError>;

    /// Resolve a path key: local numeric id, then Zoho id, then adjustment number.
    async fn resolve(&self, key: &str) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        let key = key.trim();
        if let Ok(id) = key.parse::<AdjustmentId>()
            && let Some(adjustment) = self.find_by_id(id).await?
        {
            return Ok(Some(adjustment));
        }
        if let Some(adjustment) = self.find_by_zoho_id(key).await? {
            return Ok(Some(adjustment));
        }
        self.find_by_number(key).await
    }

    /// List adjustments (newest first) and the total matching count.
    async fn list(
        &self,
        filter: &AdjustmentFilter,
    ) -> Result<(Vec<InventoryAdjustment>, i64), RepositoryError>;

    /// Insert or update by Zoho id, marking the record `synced`.
    ///
    /// Existing processing state is preserved.
    async fn upsert_synced(&self, new: &NewAdjustment) -> Result<UpsertOutcome, RepositoryError>;

    /// Mark a Zoho adjustment `sync_failed`.
    ///
    /// Inserts the placeholder when the adjustment is unknown locally. Returns
    /// `None` when there is neither a record nor a placeholder.
    async fn record_sync_failure(
        &self,
        failure: &SyncFailure,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError>;

    /// Ids of synced adjustments that can be claimed, oldest first.
    async fn claimable_ids(&self) -> Result<Vec<AdjustmentId>, RepositoryError>;

    /// Atomically move a synced `pending`/`failed` adjustment to `processing`.
    ///
    /// Returns `None` if the adjustment is missing or not claimable.
    async fn claim(
        &self,
        id: AdjustmentId,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError>;

    /// Move `processing` adjustments last touched at or before `cutoff` to
    /// `failed` so they can be claimed again.
    ///
    /// Returns the number of claims released.
    async fn release_stale_claims(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;

    /// Apply deltas to outlet stock and mark the adjustment `processed`, all
    /// or nothing.
    async fn apply_deltas(
        &self,
        id: AdjustmentId,
        deltas: &[StockDelta],
    ) -> Result<Vec<AppliedLine>, ApplyError>;

    /// Move a claimed adjustment to `failed`.
    async fn mark_failed(
        &self,
        id: AdjustmentId,
        error: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError>;

    /// Move a claimed adjustment to `skipped`.
    async fn mark_skipped(
        &self,
        id: AdjustmentId,
        reason: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError>;
}

/// Storage for outlet stock.
#[async_trait]
pub trait OutletStockStore: Send + Sync {
    async fn list_stock(
        &self,
        filter: &StockFilter,
    ) -> Result<Vec<OutletStockItem>, RepositoryError>;

    async fn get_stock(
        &self,
        id: OutletStockId,
    ) -> Result<Option<OutletStockItem>, RepositoryError>;

    /// Create or replace a stock row, setting its quantity.
    async fn upsert_stock(
        &self,
        input: &UpsertStockInput,
    ) -> Result<OutletStockItem, RepositoryError>;
}

/// `PostgreSQL` store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// `processing_error` left on a claim that was released by
/// [`AdjustmentStore::release_stale_claims`].
pub const STALE_CLAIM_ERROR: &str = "processing claim expired before completion";

/// Map unique violations to `RepositoryError::Conflict`.
fn conflict_or(err: sqlx::Error, message: impl FnOnce() -> String) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message());
    }
    RepositoryError::Database(err)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
