//! Applying synced adjustments to outlet stock.
//!
//! Claims older than the claim timeout are released to `failed` at the start
//! of each run.
//!
//! For each adjustment:
//! 1. Claim it (`synced` and `pending`/`failed` → `processing`)
//! 2. Skip value-only adjustments and Zoho statuses other than `adjusted`
//! 3. Resolve each line's location to a module
//! 4. Add every non-zero signed quantity to the matching outlet stock row,
//!    all or nothing
//! 5. Mark `processed`, or `failed` with the reason

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use outlet_stock_core::{
    AdjustmentId, AdjustmentType, LocationModuleMap, ProcessingStatus, SyncStatus,
};

use super::ItemError;
use crate::db::{AdjustmentStore, ApplyError, RepositoryError};
use crate::models::{AppliedLine, InventoryAdjustment, StockDelta};

/// Errors from the processing service.
///
/// Per-adjustment failures (unmapped location, missing stock) are not errors;
/// they are reported in the [`ProcessOutcome`].
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("inventory adjustment {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Why an adjustment's lines cannot be turned into stock deltas.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("line {line} ({item}) has no location")]
    MissingLocation { line: usize, item: String },

    #[error("line {line} ({item}): location \"{location}\" is not mapped to a module")]
    UnmappedLocation {
        line: usize,
        item: String,
        location: String,
    },
}

/// What happened to one adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessResult {
    Processed,
    Skipped,
    Failed,
    /// Already processed, in flight, or not synced. Stock was not touched.
    NotClaimable,
}

/// Outcome of processing one adjustment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub adjustment_id: AdjustmentId,
    pub adjustment_number: String,
    pub result: ProcessResult,
    pub processing_status: ProcessingStatus,
    pub message: Option<String>,
    pub applied: Vec<AppliedLine>,
}

impl ProcessOutcome {
    fn new(adjustment: &InventoryAdjustment, result: ProcessResult) -> Self {
        Self {
            adjustment_id: adjustment.id,
            adjustment_number: adjustment.adjustment_number.clone(),
            result,
            processing_status: adjustment.processing_status,
            message: adjustment.processing_error.clone(),
            applied: Vec::new(),
        }
    }

    fn not_claimable(adjustment: &InventoryAdjustment) -> Self {
        let message = if adjustment.sync_status != SyncStatus::Synced {
            format!("sync status is {}", adjustment.sync_status)
        } else if adjustment.processing_status.is_final() {
            format!("already {}", adjustment.processing_status)
        } else {
            format!("processing status is {}", adjustment.processing_status)
        };
        Self {
            message: Some(message),
            ..Self::new(adjustment, ProcessResult::NotClaimable)
        }
    }
}

/// Summary of a batch of processing runs.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub not_claimable: usize,
    pub results: Vec<ProcessOutcome>,
    pub errors: Vec<ItemError>,
}

impl ProcessReport {
    fn record(&mut self, outcome: ProcessOutcome) {
        match outcome.result {
            ProcessResult::Processed => self.processed += 1,
            ProcessResult::Skipped => self.skipped += 1,
            ProcessResult::Failed => {
                self.failed += 1;
                self.errors.push(ItemError::new(
                    outcome.adjustment_id.to_string(),
                    outcome.message.as_deref().unwrap_or("processing failed"),
                ));
            }
            ProcessResult::NotClaimable => self.not_claimable += 1,
        }
        self.results.push(outcome);
    }

    fn record_error(&mut self, key: &str, error: &ProcessingError) {
        self.failed += 1;
        self.errors.push(ItemError::new(key, error));
    }
}

/// Why an adjustment should be left alone, if it should.
#[must_use]
pub fn skip_reason(adjustment: &InventoryAdjustment) -> Option<String> {
    if adjustment.adjustment_type == AdjustmentType::Value {
        return Some("value adjustment does not change quantities".to_string());
    }
    if let Some(status) = adjustment.zoho_status.as_deref()
        && !status.eq_ignore_ascii_case("adjusted")
    {
        return Some(format!("Zoho status is {status}"));
    }
    None
}

/// Turn an adjustment's non-zero lines into per-module stock deltas.
///
/// # Errors
///
/// Returns `PlanError` for the first line whose location is missing or
/// unmapped.
pub fn plan_deltas(
    adjustment: &InventoryAdjustment,
    modules: &LocationModuleMap,
) -> Result<Vec<StockDelta>, PlanError> {
    let mut deltas = Vec::new();

    for (index, line) in adjustment.line_items.iter().enumerate() {
        if line.quantity.is_zero() {
            continue;
        }

        let location = line
            .location_name
            .as_deref()
            .or(adjustment.location_name.as_deref())
            .ok_or_else(|| PlanError::MissingLocation {
                line: index + 1,
                item: line.name.clone(),
            })?;

        let module = modules
            .resolve(location)
            .ok_or_else(|| PlanError::UnmappedLocation {
                line: index + 1,
                item: line.name.clone(),
                location: location.to_string(),
            })?;

        deltas.push(StockDelta {
            line_index: index,
            module: module.clone(),
            item_id: line.item_id.clone(),
            sku: line.sku.clone(),
            name: line.name.clone(),
            quantity: line.quantity,
        });
    }

    Ok(deltas)
}

const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Applies synced adjustments to outlet stock.
#[derive(Clone)]
pub struct ProcessingService {
    store: Arc<dyn AdjustmentStore>,
    modules: Arc<LocationModuleMap>,
    claim_timeout: Duration,
}

impl ProcessingService {
    /// Create a new processing service.
    #[must_use]
    pub fn new(store: Arc<dyn AdjustmentStore>, modules: LocationModuleMap) -> Self {
        Self {
            store,
            modules: Arc::new(modules),
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
        }
    }

    /// Set how long a `processing` claim may stay open before it is released.
    #[must_use]
    pub fn with_claim_timeout(mut self, timeout: Duration) -> Self {
        self.claim_timeout = timeout;
        self
    }

    /// Release claims older than the claim timeout back to `failed`.
    ///
    /// # Errors
    ///
    /// Returns `ProcessingError::Repository` if the store fails.
    pub async fn release_stale_claims(&self) -> Result<u64, ProcessingError> {
        let Some(cutoff) = TimeDelta::from_std(self.claim_timeout)
            .ok()
            .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
        else {
            return Ok(0);
        };

        let released = self.store.release_stale_claims(cutoff).await?;
        if released > 0 {
            warn!(released, "Released stale processing claims");
        }
        Ok(released)
    }

    /// Process the adjustment identified by a local id, Zoho id, or number.
    ///
    /// # Errors
    ///
    /// Returns `ProcessingError::NotFound` if nothing matches `key`.
    pub async fn process(&self, key: &str) -> Result<ProcessOutcome, ProcessingError> {
        self.release_stale_claims().await?;
        self.process_key(key).await
    }

    async fn process_key(&self, key: &str) -> Result<ProcessOutcome, ProcessingError> {
        let adjustment = self
            .store
            .resolve(key)
            .await?
            .ok_or_else(|| ProcessingError::NotFound(key.to_string()))?;
        self.process_adjustment(adjustment.id).await
    }

    /// Process one adjustment by local id.
    ///
    /// # Errors
    ///
    /// Returns `ProcessingError::NotFound` if the adjustment does not exist,
    /// or `ProcessingError::Repository` if the store fails.
    #[instrument(skip(self))]
    pub async fn process_adjustment(
        &self,
        id: AdjustmentId,
    ) -> Result<ProcessOutcome, ProcessingError> {
        let Some(adjustment) = self.store.claim(id).await? else {
            let current = self
                .store
                .find_by_id(id)
                .await?
                .ok_or_else(|| ProcessingError::NotFound(id.to_string()))?;
            return Ok(ProcessOutcome::not_claimable(&current));
        };

        if let Some(reason) = skip_reason(&adjustment) {
            return self.skip(&adjustment, &reason).await;
        }

        let deltas = match plan_deltas(&adjustment, &self.modules) {
            Ok(deltas) => deltas,
            Err(e) => return self.fail(&adjustment, &e.to_string()).await,
        };

        if deltas.is_empty() {
            return self.skip(&adjustment, "no non-zero quantity lines").await;
        }

        match self.store.apply_deltas(id, &deltas).await {
            Ok(applied) => {
                for line in applied.iter().filter(|l| l.new_quantity < Decimal::ZERO) {
                    warn!(
                        adjustment = %adjustment.adjustment_number,
                        module = %line.module,
                        item = %line.name,
                        quantity = %line.new_quantity,
                        "Outlet stock went negative"
                    );
                }
                info!(
                    adjustment = %adjustment.adjustment_number,
                    lines = applied.len(),
                    "Applied inventory adjustment to outlet stock"
                );
                Ok(ProcessOutcome {
                    processing_status: ProcessingStatus::Processed,
                    message: None,
                    applied,
                    ..ProcessOutcome::new(&adjustment, ProcessResult::Processed)
                })
            }
            Err(e @ ApplyError::StockNotFound { .. }) => self.fail(&adjustment, &e.to_string()).await,
            Err(ApplyError::NotClaimed(_)) => {
                let current = self
                    .store
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| ProcessingError::NotFound(id.to_string()))?;
                Ok(ProcessOutcome::not_claimable(&current))
            }
            Err(ApplyError::Repository(e)) => {
                if let Err(mark_err) = self.store.mark_failed(id, &e.to_string()).await {
                    warn!(error = %mark_err, "Could not mark adjustment failed");
                }
                Err(e.into())
            }
        }
    }

    /// Process several adjustments in order.
    ///
    /// Missing keys and store errors are reported per item; the batch continues.
    pub async fn process_many(&self, keys: &[String]) -> ProcessReport {
        if let Err(e) = self.release_stale_claims().await {
            warn!(error = %e, "Could not release stale processing claims");
        }

        let mut report = ProcessReport::default();
        for key in keys {
            match self.process_key(key).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(adjustment = %key, error = %e, "Failed to process adjustment");
                    report.record_error(key, &e);
                }
            }
        }
        report
    }

    /// Process every synced adjustment that is pending or previously failed.
    ///
    /// # Errors
    ///
    /// Returns `ProcessingError::Repository` if stale claims cannot be released
    /// or the claimable ids cannot be listed.
    #[instrument(skip(self))]
    pub async fn process_all_synced(&self) -> Result<ProcessReport, ProcessingError> {
        self.release_stale_claims().await?;
        let ids = self.store.claimable_ids().await?;
        info!(count = ids.len(), "Processing synced adjustments");

        let mut report = ProcessReport::default();
        for id in ids {
            match self.process_adjustment(id).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(adjustment_id = %id, error = %e, "Failed to process adjustment");
                    report.record_error(&id.to_string(), &e);
                }
            }
        }
        Ok(report)
    }

    async fn skip(
        &self,
        adjustment: &InventoryAdjustment,
        reason: &str,
    ) -> Result<ProcessOutcome, ProcessingError> {
        info!(adjustment = %adjustment.adjustment_number, reason, "Skipping adjustment");
        let updated = self.store.mark_skipped(adjustment.id, reason).await?;
        Ok(ProcessOutcome::new(
            updated.as_ref().unwrap_or(adjustment),
            ProcessResult::Skipped,
        ))
    }

    async fn fail(
        &self,
        adjustment: &InventoryAdjustment,
        error: &str,
    ) -> Result<ProcessOutcome, ProcessingError> {
        warn!(adjustment = %adjustment.adjustment_number, error, "Adjustment processing failed");
        let updated = self.store.mark_failed(adjustment.id, error).await?;
        Ok(ProcessOutcome {
            message: Some(error.to_string()),
            ..ProcessOutcome::new(updated.as_ref().unwrap_or(adjustment), ProcessResult::Failed)
        })
    }
}
