//! Outlet stock domain models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use outlet_stock_core::{AdjustmentId, Module, OutletStockId, StockKind};

/// Stock of one raw material or finished good held by a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutletStockItem {
    pub id: OutletStockId,
    /// Outlet or kitchen holding the stock.
    pub module: Module,
    pub kind: StockKind,
    pub name: String,
    pub sku: Option<String>,
    /// Zoho `item_id` this stock row tracks.
    pub zoho_item_id: Option<String>,
    /// Current quantity. May go negative after wastage is applied.
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or replacing an outlet stock row.
///
/// Rows are keyed by `(module, zoho_item_id)` when an item id is given,
/// otherwise by `(module, kind, lowercase name)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertStockInput {
    pub module: Module,
    pub kind: StockKind,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub zoho_item_id: Option<String>,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Filters for listing outlet stock.
#[derive(Debug, Clone, Default)]
pub struct StockFilter {
    pub module: Option<Module>,
    pub kind: Option<StockKind>,
}

impl StockFilter {
    #[must_use]
    pub fn matches(&self, item: &OutletStockItem) -> bool {
        self.module.as_ref().is_none_or(|m| *m == item.module)
            && self.kind.is_none_or(|k| k == item.kind)
    }
}

/// A signed quantity change to apply to one module's stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDelta {
    /// Index of the adjustment line this delta comes from.
    pub line_index: usize,
    pub module: Module,
    pub item_id: Option<String>,
    pub sku: Option<String>,
    pub name: String,
    pub quantity: Decimal,
}

impl StockDelta {
    /// Whether an outlet stock row in the same module matches by Zoho item id.
    #[must_use]
    pub fn matches_item_id(&self, item: &OutletStockItem) -> bool {
        self.item_id.is_some() && item.zoho_item_id == self.item_id
    }

    /// Whether an outlet stock row matches by SKU.
    #[must_use]
    pub fn matches_sku(&self, item: &OutletStockItem) -> bool {
        self.sku.is_some() && item.sku == self.sku
    }

    /// Whether an outlet stock row matches by name, ignoring case.
    #[must_use]
    pub fn matches_name(&self, item: &OutletStockItem) -> bool {
        item.name.to_lowercase() == self.name.to_lowercase()
    }

    /// Human-readable item reference for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.item_id, &self.sku) {
            (Some(item_id), _) => format!("{} (item {item_id})", self.name),
            (None, Some(sku)) => format!("{} (sku {sku})", self.name),
            (None, None) => self.name.clone(),
        }
    }
}

/// A delta that was applied to outlet stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedLine {
    pub adjustment_id: AdjustmentId,
    pub line_index: usize,
    pub stock_id: OutletStockId,
    pub module: Module,
    pub name: String,
    pub delta: Decimal,
    pub previous_quantity: Decimal,
    pub new_quantity: Decimal,
}
