//! `PostgreSQL` storage for inventory adjustments.
//!
//! Queries are checked at runtime so the crate builds without a database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::instrument;

use outlet_stock_core::{
    AdjustmentId, AdjustmentType, OutletStockId, ProcessingStatus, SyncStatus,
};

use super::{
    AdjustmentStore, ApplyError, PgStore, RepositoryError, STALE_CLAIM_ERROR, conflict_or,
};
use crate::models::{
    AdjustmentFilter, AdjustmentLine, AppliedLine, InventoryAdjustment, NewAdjustment,
    StockDelta, SyncFailure, UpsertOutcome,
};

const ADJUSTMENT_COLUMNS: &str = "id, adjustment_number, date, reason, description, \
     adjustment_type, zoho_status, location_name, line_items, sync_status, sync_error, \
     processing_status, processing_error, zoho_adjustment_id, last_synced_at, processed_at, \
     created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AdjustmentRow {
    id: i32,
    adjustment_number: String,
    date: NaiveDate,
    reason: Option<String>,
    description: Option<String>,
    adjustment_type: AdjustmentType,
    zoho_status: Option<String>,
    location_name: Option<String>,
    line_items: serde_json::Value,
    sync_status: SyncStatus,
    sync_error: Option<String>,
    processing_status: ProcessingStatus,
    processing_error: Option<String>,
    zoho_adjustment_id: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AdjustmentRow> for InventoryAdjustment {
    type Error = RepositoryError;

    fn try_from(row: AdjustmentRow) -> Result<Self, Self::Error> {
        let line_items: Vec<AdjustmentLine> = serde_json::from_value(row.line_items)
            .map_err(|e| {
                RepositoryError::DataCorruption(format!(
                    "invalid line items on adjustment {}: {e}",
                    row.id
                ))
            })?;

        Ok(Self {
            id: AdjustmentId::new(row.id),
            adjustment_number: row.adjustment_number,
            date: row.date,
            reason: row.reason,
            description: row.description,
            adjustment_type: row.adjustment_type,
            zoho_status: row.zoho_status,
            location_name: row.location_name,
            line_items,
            sync_status: row.sync_status,
            sync_error: row.sync_error,
            processing_status: row.processing_status,
            processing_error: row.processing_error,
            zoho_adjustment_id: row.zoho_adjustment_id,
            last_synced_at: row.last_synced_at,
            processed_at: row.processed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    row: AdjustmentRow,
    inserted: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct LockedStockRow {
    id: i32,
    name: String,
    quantity: Decimal,
}

fn line_items_json(lines: &[AdjustmentLine]) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(lines)
        .map_err(|e| RepositoryError::DataCorruption(format!("unserializable line items: {e}")))
}

fn optional(row: Option<AdjustmentRow>) -> Result<Option<InventoryAdjustment>, RepositoryError> {
    row.map(TryInto::try_into).transpose()
}

/// Escape ILIKE wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &AdjustmentFilter) {
    builder.push(" WHERE TRUE");
    if let Some(status) = filter.sync_status {
        builder.push(" AND sync_status = ").push_bind(status);
    }
    if let Some(status) = filter.processing_status {
        builder.push(" AND processing_status = ").push_bind(status);
    }
    if let Some(search) = filter.search.as_deref() {
        let pattern = format!("%{}%", escape_like(search));
        builder
            .push(" AND (adjustment_number ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR reason ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR zoho_adjustment_id ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl PgStore {
    async fn fetch_one_where(
        &self,
        condition: &str,
        value: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        let sql = format!("SELECT {ADJUSTMENT_COLUMNS} FROM inventory_adjustments WHERE {condition}");
        let row = sqlx::query_as::<_, AdjustmentRow>(&sql)
            .bind(value)
            .fetch_optional(self.pool())
            .await?;
        optional(row)
    }

    async fn set_processing_outcome(
        &self,
        id: AdjustmentId,
        status: ProcessingStatus,
        message: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        let sql = format!(
            r"
            UPDATE inventory_adjustments
            SET processing_status = $2, processing_error = $3, updated_at = NOW()
            WHERE id = $1 AND processing_status = 'processing'
            RETURNING {ADJUSTMENT_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, AdjustmentRow>(&sql)
            .bind(id)
            .bind(status)
            .bind(message)
            .fetch_optional(self.pool())
            .await?;
        optional(row)
    }
}

/// Lock the outlet stock row a delta applies to.
///
/// Tries the Zoho item id, then SKU, then case-insensitive name, all within
/// the delta's module.
async fn lock_matching_stock(
    tx: &mut Transaction<'_, Postgres>,
    delta: &StockDelta,
) -> Result<Option<LockedStockRow>, sqlx::Error> {
    let module = delta.module.as_str();

    if let Some(item_id) = delta.item_id.as_deref() {
        let row = sqlx::query_as::<_, LockedStockRow>(
            r"
            SELECT id, name, quantity FROM outlet_stock
            WHERE module = $1 AND zoho_item_id = $2
            FOR UPDATE
            ",
        )
        .bind(module)
        .bind(item_id)
        .fetch_optional(&mut **tx)
        .await?;
        if row.is_some() {
            return Ok(row);
        }
    }

    if let Some(sku) = delta.sku.as_deref() {
        let row = sqlx::query_as::<_, LockedStockRow>(
            r"
            SELECT id, name, quantity FROM outlet_stock
            WHERE module = $1 AND sku = $2
            ORDER BY kind, id
            LIMIT 1
            FOR UPDATE
            ",
        )
        .bind(module)
        .bind(sku)
        .fetch_optional(&mut **tx)
        .await?;
        if row.is_some() {
            return Ok(row);
        }
    }

    sqlx::query_as::<_, LockedStockRow>(
        r"
        SELECT id, name, quantity FROM outlet_stock
        WHERE module = $1 AND lower(name) = lower($2)
        ORDER BY kind, id
        LIMIT 1
        FOR UPDATE
        ",
    )
    .bind(module)
    .bind(&delta.name)
    .fetch_optional(&mut **tx)
    .await
}

#[async_trait]
impl AdjustmentStore for PgStore {
    async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: AdjustmentId,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        let sql = format!("SELECT {ADJUSTMENT_COLUMNS} FROM inventory_adjustments WHERE id = $1");
        let row = sqlx::query_as::<_, AdjustmentRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        optional(row)
    }

    async fn find_by_zoho_id(
        &self,
        zoho_adjustment_id: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        self.fetch_one_where("zoho_adjustment_id = $1", zoho_adjustment_id)
            .await
    }

    async fn find_by_number(
        &self,
        adjustment_number: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        self.fetch_one_where("adjustment_number = $1", adjustment_number)
            .await
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        filter: &AdjustmentFilter,
    ) -> Result<(Vec<InventoryAdjustment>, i64), RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM inventory_adjustments");
        push_filters(&mut count, filter);
        let total = count.build_query_scalar::<i64>().fetch_one(self.pool()).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM inventory_adjustments"
        ));
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY date DESC, id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = select
            .build_query_as::<AdjustmentRow>()
            .fetch_all(self.pool())
            .await?;

        let items = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, total))
    }

    #[instrument(skip(self, new), fields(zoho_adjustment_id = %new.zoho_adjustment_id))]
    async fn upsert_synced(&self, new: &NewAdjustment) -> Result<UpsertOutcome, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO inventory_adjustments (
                zoho_adjustment_id, adjustment_number, date, reason, description,
                adjustment_type, zoho_status, location_name, line_items,
                sync_status, sync_error, last_synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'synced', NULL, NOW())
            ON CONFLICT (zoho_adjustment_id) DO UPDATE SET
                adjustment_number = EXCLUDED.adjustment_number,
                date = EXCLUDED.date,
                reason = EXCLUDED.reason,
                description = EXCLUDED.description,
                adjustment_type = EXCLUDED.adjustment_type,
                zoho_status = EXCLUDED.zoho_status,
                location_name = EXCLUDED.location_name,
                line_items = EXCLUDED.line_items,
                sync_status = 'synced',
                sync_error = NULL,
                last_synced_at = NOW(),
                updated_at = NOW()
            RETURNING {ADJUSTMENT_COLUMNS}, (xmax = 0) AS inserted
            "
        );

        let row = sqlx::query_as::<_, UpsertRow>(&sql)
            .bind(&new.zoho_adjustment_id)
            .bind(&new.adjustment_number)
            .bind(new.date)
            .bind(new.reason.as_deref())
            .bind(new.description.as_deref())
            .bind(new.adjustment_type)
            .bind(new.zoho_status.as_deref())
            .bind(new.location_name.as_deref())
            .bind(line_items_json(&new.line_items)?)
            .fetch_one(self.pool())
            .await
            .map_err(|e| {
                conflict_or(e, || {
                    format!(
                        "adjustment number {} already belongs to another adjustment",
                        new.adjustment_number
                    )
                })
            })?;

        let adjustment = row.row.try_into()?;
        Ok(if row.inserted {
            UpsertOutcome::Created(adjustment)
        } else {
            UpsertOutcome::Updated(adjustment)
        })
    }

    #[instrument(skip(self, failure), fields(zoho_adjustment_id = %failure.zoho_adjustment_id))]
    async fn record_sync_failure(
        &self,
        failure: &SyncFailure,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        let Some(placeholder) = failure.placeholder.as_ref() else {
            let sql = format!(
                r"
                UPDATE inventory_adjustments
                SET sync_status = 'sync_failed', sync_error = $2,
                    last_synced_at = NOW(), updated_at = NOW()
                WHERE zoho_adjustment_id = $1
                RETURNING {ADJUSTMENT_COLUMNS}
                "
            );
            let row = sqlx::query_as::<_, AdjustmentRow>(&sql)
                .bind(&failure.zoho_adjustment_id)
                .bind(&failure.error)
                .fetch_optional(self.pool())
                .await?;
            return optional(row);
        };

        let sql = format!(
            r"
            INSERT INTO inventory_adjustments (
                zoho_adjustment_id, adjustment_number, date, reason, description,
                adjustment_type, zoho_status, location_name, line_items,
                sync_status, sync_error, last_synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'sync_failed', $10, NOW())
            ON CONFLICT (zoho_adjustment_id) DO UPDATE SET
                sync_status = 'sync_failed',
                sync_error = EXCLUDED.sync_error,
                last_synced_at = NOW(),
                updated_at = NOW()
            RETURNING {ADJUSTMENT_COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, AdjustmentRow>(&sql)
            .bind(&failure.zoho_adjustment_id)
            .bind(&placeholder.adjustment_number)
            .bind(placeholder.date)
            .bind(placeholder.reason.as_deref())
            .bind(placeholder.description.as_deref())
            .bind(placeholder.adjustment_type)
            .bind(placeholder.zoho_status.as_deref())
            .bind(placeholder.location_name.as_deref())
            .bind(line_items_json(&placeholder.line_items)?)
            .bind(&failure.error)
            .fetch_one(self.pool())
            .await
            .map_err(|e| {
                conflict_or(e, || {
                    format!(
                        "adjustment number {} already belongs to another adjustment",
                        placeholder.adjustment_number
                    )
                })
            })?;

        Ok(Some(row.try_into()?))
    }

    async fn claimable_ids(&self) -> Result<Vec<AdjustmentId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, AdjustmentId>(
            r"
            SELECT id FROM inventory_adjustments
            WHERE sync_status = 'synced' AND processing_status IN ('pending', 'failed')
            ORDER BY date, id
            ",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn claim(
        &self,
        id: AdjustmentId,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        let sql = format!(
            r"
            UPDATE inventory_adjustments
            SET processing_status = 'processing', processing_error = NULL, updated_at = NOW()
            WHERE id = $1
              AND sync_status = 'synced'
              AND processing_status IN ('pending', 'failed')
            RETURNING {ADJUSTMENT_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, AdjustmentRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        optional(row)
    }

    #[instrument(skip(self))]
    async fn release_stale_claims(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE inventory_adjustments
            SET processing_status = 'failed', processing_error = $2, updated_at = NOW()
            WHERE processing_status = 'processing' AND updated_at <= $1
            ",
        )
        .bind(cutoff)
        .bind(STALE_CLAIM_ERROR)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, deltas), fields(lines = deltas.len()))]
    async fn apply_deltas(
        &self,
        id: AdjustmentId,
        deltas: &[StockDelta],
    ) -> Result<Vec<AppliedLine>, ApplyError> {
        let mut tx = self.pool().begin().await.map_err(RepositoryError::from)?;
        let mut applied = Vec::with_capacity(deltas.len());

        for delta in deltas {
            let Some(stock) = lock_matching_stock(&mut tx, delta)
                .await
                .map_err(RepositoryError::from)?
            else {
                // Dropping the transaction rolls back earlier lines
                return Err(ApplyError::StockNotFound {
                    line: delta.line_index + 1,
                    module: delta.module.clone(),
                    item: delta.describe(),
                });
            };

            let new_quantity: Decimal = sqlx::query_scalar(
                r"
                UPDATE outlet_stock
                SET quantity = quantity + $2, updated_at = NOW()
                WHERE id = $1
                RETURNING quantity
                ",
            )
            .bind(stock.id)
            .bind(delta.quantity)
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

            applied.push(AppliedLine {
                adjustment_id: id,
                line_index: delta.line_index,
                stock_id: OutletStockId::new(stock.id),
                module: delta.module.clone(),
                name: stock.name,
                delta: delta.quantity,
                previous_quantity: stock.quantity,
                new_quantity,
            });
        }

        let result = sqlx::query(
            r"
            UPDATE inventory_adjustments
            SET processing_status = 'processed', processing_error = NULL,
                processed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND processing_status = 'processing'
            ",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(ApplyError::NotClaimed(id));
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(applied)
    }

    async fn mark_failed(
        &self,
        id: AdjustmentId,
        error: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        self.set_processing_outcome(id, ProcessingStatus::Failed, error)
            .await
    }

    async fn mark_skipped(
        &self,
        id: AdjustmentId,
        reason: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        self.set_processing_outcome(id, ProcessingStatus::Skipped, reason)
            .await
    }
}
