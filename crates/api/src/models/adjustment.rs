//! Inventory adjustment domain models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use outlet_stock_core::{AdjustmentId, AdjustmentType, ProcessingStatus, SyncStatus};

/// A Zoho inventory adjustment mirrored into the local database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAdjustment {
    /// Local primary key.
    pub id: AdjustmentId,
    /// Human-facing adjustment number (unique).
    pub adjustment_number: String,
    /// Date the adjustment was made in Zoho.
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub description: Option<String>,
    pub adjustment_type: AdjustmentType,
    /// Zoho's own status (`adjusted`, `draft`).
    pub zoho_status: Option<String>,
    /// Header-level location, used when a line has none.
    pub location_name: Option<String>,
    pub line_items: Vec<AdjustmentLine>,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub processing_status: ProcessingStatus,
    /// Last processing failure or skip reason.
    pub processing_error: Option<String>,
    /// Zoho `inventory_adjustment_id`.
    pub zoho_adjustment_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of an adjustment: a signed quantity delta for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentLine {
    pub line_item_id: Option<String>,
    /// Zoho `item_id`.
    pub item_id: Option<String>,
    pub sku: Option<String>,
    pub name: String,
    /// Asset account the adjustment is booked against.
    pub account_name: Option<String>,
    /// Signed delta: negative for wastage or shrinkage.
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub location_name: Option<String>,
}

/// Fields written by a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdjustment {
    pub zoho_adjustment_id: String,
    pub adjustment_number: String,
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub description: Option<String>,
    pub adjustment_type: AdjustmentType,
    pub zoho_status: Option<String>,
    pub location_name: Option<String>,
    pub line_items: Vec<AdjustmentLine>,
}

/// A failed sync for one Zoho adjustment.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub zoho_adjustment_id: String,
    /// Record to insert when the adjustment is not yet known locally.
    pub placeholder: Option<NewAdjustment>,
    pub error: String,
}

/// Whether an upsert inserted or updated.
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    Created(InventoryAdjustment),
    Updated(InventoryAdjustment),
}

impl UpsertOutcome {
    /// The stored adjustment.
    #[must_use]
    pub const fn adjustment(&self) -> &InventoryAdjustment {
        match self {
            Self::Created(adjustment) | Self::Updated(adjustment) => adjustment,
        }
    }
}

/// Filters for listing adjustments.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentFilter {
    pub sync_status: Option<SyncStatus>,
    pub processing_status: Option<ProcessingStatus>,
    /// Case-insensitive match on adjustment number, reason, or Zoho id.
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl AdjustmentFilter {
    /// Whether an adjustment passes the status and search filters.
    #[must_use]
    pub fn matches(&self, adjustment: &InventoryAdjustment) -> bool {
        if self
            .sync_status
            .is_some_and(|status| status != adjustment.sync_status)
        {
            return false;
        }
        if self
            .processing_status
            .is_some_and(|status| status != adjustment.processing_status)
        {
            return false;
        }
        let Some(search) = self.search.as_deref() else {
            return true;
        };
        let needle = search.to_lowercase();
        let contains = |value: Option<&str>| {
            value.is_some_and(|v| v.to_lowercase().contains(&needle))
        };
        contains(Some(&adjustment.adjustment_number))
            || contains(adjustment.reason.as_deref())
            || contains(adjustment.zoho_adjustment_id.as_deref())
    }
}

/// Sync and processing state of one adjustment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentStatus {
    pub id: AdjustmentId,
    pub adjustment_number: String,
    pub zoho_adjustment_id: Option<String>,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<&InventoryAdjustment> for AdjustmentStatus {
    fn from(adjustment: &InventoryAdjustment) -> Self {
        Self {
            id: adjustment.id,
            adjustment_number: adjustment.adjustment_number.clone(),
            zoho_adjustment_id: adjustment.zoho_adjustment_id.clone(),
            sync_status: adjustment.sync_status,
            sync_error: adjustment.sync_error.clone(),
            processing_status: adjustment.processing_status,
            processing_error: adjustment.processing_error.clone(),
            last_synced_at: adjustment.last_synced_at,
            processed_at: adjustment.processed_at,
        }
    }
}
