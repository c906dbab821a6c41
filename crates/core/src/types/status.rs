//! Status enums for inventory adjustments and outlet stock.

use serde::{Deserialize, Serialize};

/// Whether the local copy of a Zoho adjustment is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "sync_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    SyncFailed,
}

impl SyncStatus {
    /// Database/wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::SyncFailed => "sync_failed",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "sync_failed" => Ok(Self::SyncFailed),
            _ => Err(format!("invalid sync status: {s}")),
        }
    }
}

/// Where an adjustment is in the apply-to-outlet-stock pipeline.
///
/// ```text
/// pending ──claim──▶ processing ──▶ processed
///    ▲                   │
///    │                   ├──────▶ skipped
/// failed ◀───────────────┘
/// ```
///
/// Only `pending` and `failed` adjustments can be claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "processing_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Processed,
    Failed,
    Skipped,
}

impl ProcessingStatus {
    /// Database/wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Whether an adjustment in this state may be claimed for processing.
    #[must_use]
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Whether stock has already been touched (or deliberately left alone)
    /// for an adjustment in this state.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Processed | Self::Skipped)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("invalid processing status: {s}")),
        }
    }
}

/// Zoho adjustment type. Only quantity adjustments move stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "adjustment_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    #[default]
    Quantity,
    Value,
}

impl AdjustmentType {
    /// Parse Zoho's `adjustment_type` field. Unknown values are treated as
    /// quantity adjustments, which is Zoho's default.
    #[must_use]
    pub fn from_zoho(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("value") => Self::Value,
            _ => Self::Quantity,
        }
    }
}

impl std::fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quantity => write!(f, "quantity"),
            Self::Value => write!(f, "value"),
        }
    }
}

/// Kind of outlet stock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "stock_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum StockKind {
    /// Ingredients and packaging consumed by the kitchen.
    RawMaterial,
    /// Prepared items sold or transferred to outlets.
    FinishedGood,
}

impl std::fmt::Display for StockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RawMaterial => write!(f, "raw_material"),
            Self::FinishedGood => write!(f, "finished_good"),
        }
    }
}

impl std::str::FromStr for StockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw_material" => Ok(Self::RawMaterial),
            "finished_good" => Ok(Self::FinishedGood),
            _ => Err(format!("invalid stock kind: {s}")),
        }
    }
}
