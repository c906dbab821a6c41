//! Business logic services.
//!
//! # Services
//!
//! - `sync` - Pull adjustments from Zoho and upsert them locally
//! - `processing` - Apply synced adjustments to outlet stock

pub mod processing;
pub mod sync;

use serde::Serialize;

pub use processing::{
    ProcessOutcome, ProcessReport, ProcessResult, ProcessingError, ProcessingService,
};
pub use sync::{SyncError, SyncOptions, SyncReport, SyncService};

/// A per-record failure reported at the end of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    /// Zoho id, local id, or adjustment number, as the caller supplied it.
    pub adjustment_id: String,
    pub error: String,
}

impl ItemError {
    #[must_use]
    pub fn new(adjustment_id: impl Into<String>, error: impl ToString) -> Self {
        Self {
            adjustment_id: adjustment_id.into(),
            error: error.to_string(),
        }
    }
}
