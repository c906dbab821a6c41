//! `PostgreSQL` storage for outlet stock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Postgres, QueryBuilder};

use outlet_stock_core::{Module, OutletStockId, StockKind};

use super::{OutletStockStore, PgStore, RepositoryError, conflict_or};
use crate::models::{OutletStockItem, StockFilter, UpsertStockInput};

const STOCK_COLUMNS: &str =
    "id, module, kind, name, sku, zoho_item_id, quantity, unit, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    id: i32,
    module: String,
    kind: StockKind,
    name: String,
    sku: Option<String>,
    zoho_item_id: Option<String>,
    quantity: Decimal,
    unit: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for OutletStockItem {
    fn from(row: StockRow) -> Self {
        Self {
            id: OutletStockId::new(row.id),
            module: Module::new(row.module),
            kind: row.kind,
            name: row.name,
            sku: row.sku,
            zoho_item_id: row.zoho_item_id,
            quantity: row.quantity,
            unit: row.unit,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl OutletStockStore for PgStore {
    async fn list_stock(
        &self,
        filter: &StockFilter,
    ) -> Result<Vec<OutletStockItem>, RepositoryError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {STOCK_COLUMNS} FROM outlet_stock WHERE TRUE"));
        if let Some(module) = filter.module.as_ref() {
            builder.push(" AND module = ").push_bind(module.as_str().to_string());
        }
        if let Some(kind) = filter.kind {
            builder.push(" AND kind = ").push_bind(kind);
        }
        builder.push(" ORDER BY module, kind, name");

        let rows = builder
            .build_query_as::<StockRow>()
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_stock(
        &self,
        id: OutletStockId,
    ) -> Result<Option<OutletStockItem>, RepositoryError> {
        let sql = format!("SELECT {STOCK_COLUMNS} FROM outlet_stock WHERE id = $1");
        let row = sqlx::query_as::<_, StockRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert_stock(
        &self,
        input: &UpsertStockInput,
    ) -> Result<OutletStockItem, RepositoryError> {
        let conflict_target = if input.zoho_item_id.is_some() {
            "(module, zoho_item_id)"
        } else {
            "(module, kind, (lower(name)))"
        };

        let sql = format!(
            r"
            INSERT INTO outlet_stock (module, kind, name, sku, zoho_item_id, quantity, unit)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT {conflict_target} DO UPDATE SET
                kind = EXCLUDED.kind,
                name = EXCLUDED.name,
                sku = EXCLUDED.sku,
                zoho_item_id = EXCLUDED.zoho_item_id,
                quantity = EXCLUDED.quantity,
                unit = EXCLUDED.unit,
                updated_at = NOW()
            RETURNING {STOCK_COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, StockRow>(&sql)
            .bind(input.module.as_str())
            .bind(input.kind)
            .bind(input.name.trim())
            .bind(input.sku.as_deref())
            .bind(input.zoho_item_id.as_deref())
            .bind(input.quantity)
            .bind(input.unit.as_deref())
            .fetch_one(self.pool())
            .await
            .map_err(|e| {
                conflict_or(e, || {
                    format!(
                        "{} already exists in module {} under a different key",
                        input.name, input.module
                    )
                })
            })?;

        Ok(row.into())
    }
}
