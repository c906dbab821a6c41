//! Zoho adjustment sync job.
//!
//! A sequential pull:
//! 1. Page through the list endpoint until `has_more_page` is false
//! 2. Fetch each adjustment's detail, pausing a fixed delay between calls
//! 3. Map fields and upsert by Zoho id
//! 4. Optionally run the processing job
//!
//! Per-adjustment failures are logged, recorded as `sync_failed`, and
//! returned in the report. Only a failure to list aborts the run.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{ItemError, ProcessReport, ProcessingError, ProcessingService};
use crate::config::SyncConfig;
use crate::db::{AdjustmentStore, RepositoryError};
use crate::models::{SyncFailure, UpsertOutcome};
use crate::zoho::{AdjustmentSource, MappingError, ZohoAdjustment, ZohoError, map_adjustment};

/// Errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    #[error("failed to list Zoho adjustments: {0}")]
    Listing(#[source] ZohoError),

    #[error("processing after sync failed: {0}")]
    Processing(#[from] ProcessingError),
}

/// Why a single adjustment failed to sync.
#[derive(Debug, Error)]
enum ItemFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] ZohoError),

    #[error("mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("save failed: {0}")]
    Store(#[from] RepositoryError),
}

/// Options for one sync run.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    /// Run processing afterwards. `None` uses the configured default.
    #[serde(default)]
    pub process: Option<bool>,
}

/// Summary of one sync run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// List pages fetched.
    pub pages: u32,
    /// The page cap was hit before Zoho reported the last page.
    pub truncated: bool,
    /// Distinct adjustments listed by Zoho.
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<ItemError>,
    pub processing: Option<ProcessReport>,
}

/// Adjustments collected from the list endpoint.
struct Listing {
    summaries: Vec<ZohoAdjustment>,
    pages: u32,
    truncated: bool,
}

/// Pulls Zoho inventory adjustments into the local store.
pub struct SyncService {
    source: Arc<dyn AdjustmentSource>,
    store: Arc<dyn AdjustmentStore>,
    processing: ProcessingService,
    config: SyncConfig,
    running: Mutex<()>,
}

impl SyncService {
    /// Create a new sync service.
    #[must_use]
    pub fn new(
        source: Arc<dyn AdjustmentSource>,
        store: Arc<dyn AdjustmentStore>,
        processing: ProcessingService,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            store,
            processing,
            config,
            running: Mutex::new(()),
        }
    }

    /// Run one sync.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::AlreadyRunning` if another run is in progress,
    /// `SyncError::Listing` if the list endpoint fails, or
    /// `SyncError::Processing` if the follow-up processing cannot start.
    #[instrument(skip(self))]
    pub async fn run(&self, options: SyncOptions) -> Result<SyncReport, SyncError> {
        let Ok(_guard) = self.running.try_lock() else {
            return Err(SyncError::AlreadyRunning);
        };

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "Starting Zoho adjustment sync");

        let listing = self.list_all().await.map_err(|e| {
            error!(%run_id, error = %e, "Listing Zoho adjustments failed");
            SyncError::Listing(e)
        })?;

        let mut report = SyncReport {
            run_id,
            started_at,
            finished_at: started_at,
            pages: listing.pages,
            truncated: listing.truncated,
            fetched: listing.summaries.len(),
            created: 0,
            updated: 0,
            failed: 0,
            errors: Vec::new(),
            processing: None,
        };

        for summary in &listing.summaries {
            tokio::time::sleep(self.config.request_delay).await;

            match self.sync_one(summary).await {
                Ok(UpsertOutcome::Created(_)) => report.created += 1,
                Ok(UpsertOutcome::Updated(_)) => report.updated += 1,
                Err(failure) => {
                    report.failed += 1;
                    report.errors.push(self.record_failure(summary, &failure).await);
                }
            }
        }

        info!(
            %run_id,
            fetched = report.fetched,
            created = report.created,
            updated = report.updated,
            failed = report.failed,
            "Zoho adjustment sync finished"
        );

        if options.process.unwrap_or(self.config.process_after_sync) {
            report.processing = Some(self.processing.process_all_synced().await?);
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Collect summaries from every list page, dropping repeats.
    async fn list_all(&self) -> Result<Listing, ZohoError> {
        let mut seen = HashSet::new();
        let mut summaries = Vec::new();
        let mut page = 1;

        loop {
            if page > 1 {
                tokio::time::sleep(self.config.request_delay).await;
            }

            let result = self.source.list_adjustments_page(page).await?;
            for summary in result.adjustments {
                // Records can shift between pages while we paginate
                if let Some(id) = summary.inventory_adjustment_id.as_deref()
                    && !seen.insert(id.to_string())
                {
                    continue;
                }
                summaries.push(summary);
            }

            if !result.has_more_page {
                return Ok(Listing {
                    summaries,
                    pages: page,
                    truncated: false,
                });
            }

            if page >= self.config.max_pages {
                warn!(
                    max_pages = self.config.max_pages,
                    "Stopping Zoho pagination at page cap"
                );
                return Ok(Listing {
                    summaries,
                    pages: page,
                    truncated: true,
                });
            }

            page += 1;
        }
    }

    async fn sync_one(&self, summary: &ZohoAdjustment) -> Result<UpsertOutcome, ItemFailure> {
        let id = summary_id(summary).ok_or(MappingError::MissingId)?;

        let mut detail = self.source.get_adjustment(id).await?;
        if detail.inventory_adjustment_id.is_none() {
            detail.inventory_adjustment_id = Some(id.to_string());
        }

        let new = map_adjustment(&detail)?;
        Ok(self.store.upsert_synced(&new).await?)
    }

    /// Log a failed adjustment and persist `sync_failed` where possible.
    async fn record_failure(&self, summary: &ZohoAdjustment, failure: &ItemFailure) -> ItemError {
        let Some(id) = summary_id(summary) else {
            warn!(error = %failure, "Skipping Zoho adjustment without an id");
            return ItemError::new("<unknown>", failure);
        };

        warn!(zoho_adjustment_id = id, error = %failure, "Failed to sync adjustment");

        let record = SyncFailure {
            zoho_adjustment_id: id.to_string(),
            placeholder: map_adjustment(summary).ok(),
            error: failure.to_string(),
        };
        if let Err(e) = self.store.record_sync_failure(&record).await {
            error!(zoho_adjustment_id = id, error = %e, "Could not record sync failure");
        }

        ItemError::new(id, failure)
    }
}

fn summary_id(summary: &ZohoAdjustment) -> Option<&str> {
    summary
        .inventory_adjustment_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use outlet_stock_core::{LocationModuleMap, ProcessingStatus, SyncStatus};

    use super::*;
    use crate::db::MemoryStore;
    use crate::zoho::{AdjustmentPage, ZohoLineItem};

    /// Scripted Zoho: fixed pages and details, with a call log.
    #[derive(Default)]
    struct FakeSource {
        pages: Vec<AdjustmentPage>,
        details: HashMap<String, ZohoAdjustment>,
        list_error: bool,
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl AdjustmentSource for FakeSource {
        async fn list_adjustments_page(&self, page: u32) -> Result<AdjustmentPage, ZohoError> {
            self.calls.lock().unwrap().push(format!("list:{page}"));
            if self.list_error {
                return Err(ZohoError::RateLimited(30));
            }
            Ok(self
                .pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_adjustment(&self, adjustment_id: &str) -> Result<ZohoAdjustment, ZohoError> {
            self.calls.lock().unwrap().push(format!("get:{adjustment_id}"));
            self.details
                .get(adjustment_id)
                .cloned()
                .ok_or_else(|| ZohoError::NotFound(adjustment_id.to_string()))
        }
    }

    fn summary(id: &str) -> ZohoAdjustment {
        ZohoAdjustment {
            inventory_adjustment_id: Some(id.to_string()),
            reference_number: Some(format!("REF-{id}")),
            date: Some("2026-10-01".to_string()),
            status: Some("adjusted".to_string()),
            location_name: Some("Central Kitchen".to_string()),
            ..ZohoAdjustment::default()
        }
    }

    fn detail(id: &str) -> ZohoAdjustment {
        ZohoAdjustment {
            line_items: vec![ZohoLineItem {
                item_id: Some("item-1".to_string()),
                name: Some("Flour".to_string()),
                quantity_adjusted: Some(Decimal::from(-2)),
                ..ZohoLineItem::default()
            }],
            ..summary(id)
        }
    }

    fn service(source: FakeSource, store: &MemoryStore, process_after_sync: bool) -> SyncService {
        let store: Arc<dyn AdjustmentStore> = Arc::new(store.clone());
        let processing = ProcessingService::new(Arc::clone(&store), LocationModuleMap::default());
        SyncService::new(
            Arc::new(source),
            store,
            processing,
            SyncConfig {
                request_delay: Duration::ZERO,
                max_pages: 3,
                process_after_sync,
                ..SyncConfig::default()
            },
        )
    }

    fn page(ids: &[&str], has_more_page: bool) -> AdjustmentPage {
        AdjustmentPage {
            adjustments: ids.iter().map(|id| summary(id)).collect(),
            has_more_page,
        }
    }

    #[tokio::test]
    async fn test_pages_until_has_more_page_is_false() {
        let source = FakeSource {
            pages: vec![page(&["a", "b"], true), page(&["b", "c"], false)],
            details: ["a", "b", "c"]
                .into_iter()
                .map(|id| (id.to_string(), detail(id)))
                .collect(),
            ..FakeSource::default()
        };
        let store = MemoryStore::new();
        let report = service(source, &store, false)
            .run(SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.pages, 2);
        assert!(!report.truncated);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.created, 3);
        assert_eq!(report.failed, 0);
        assert!(report.processing.is_none());

        let stored = store.find_by_zoho_id("c").await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert_eq!(stored.processing_status, ProcessingStatus::Pending);
        assert_eq!(stored.line_items.len(), 1);
    }

    #[tokio::test]
    async fn test_page_cap_truncates() {
        let source = FakeSource {
            pages: vec![
                page(&["a"], true),
                page(&["b"], true),
                page(&["c"], true),
                page(&["d"], false),
            ],
            details: ["a", "b", "c", "d"]
                .into_iter()
                .map(|id| (id.to_string(), detail(id)))
                .collect(),
            ..FakeSource::default()
        };
        let report = service(source, &MemoryStore::new(), false)
            .run(SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.pages, 3);
        assert!(report.truncated);
        assert_eq!(report.fetched, 3);
    }

    #[tokio::test]
    async fn test_detail_failure_is_recorded_and_loop_continues() {
        let source = FakeSource {
            pages: vec![page(&["a", "missing", "c"], false)],
            details: ["a", "c"]
                .into_iter()
                .map(|id| (id.to_string(), detail(id)))
                .collect(),
            ..FakeSource::default()
        };
        let store = MemoryStore::new();
        let report = service(source, &store, false)
            .run(SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].adjustment_id, "missing");
        assert!(report.errors[0].error.contains("Not found"));

        let placeholder = store.find_by_zoho_id("missing").await.unwrap().unwrap();
        assert_eq!(placeholder.sync_status, SyncStatus::SyncFailed);
        assert!(placeholder.sync_error.is_some());
        assert_eq!(placeholder.adjustment_number, "REF-missing");
    }

    #[tokio::test]
    async fn test_listing_failure_aborts() {
        let source = FakeSource {
            list_error: true,
            ..FakeSource::default()
        };
        let err = service(source, &MemoryStore::new(), false)
            .run(SyncOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Listing(ZohoError::RateLimited(30))));
    }

    #[tokio::test]
    async fn test_resync_keeps_processed_status() {
        let store = MemoryStore::new();
        let make_source = || FakeSource {
            pages: vec![page(&["a"], false)],
            details: HashMap::from([("a".to_string(), detail("a"))]),
            ..FakeSource::default()
        };

        service(make_source(), &store, false)
            .run(SyncOptions::default())
            .await
            .unwrap();
        let id = store.find_by_zoho_id("a").await.unwrap().unwrap().id;
        store.claim(id).await.unwrap();
        store.mark_skipped(id, "test").await.unwrap();

        let report = service(make_source(), &store, false)
            .run(SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.updated, 1);

        let stored = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Skipped);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_process_option_runs_processing() {
        let source = FakeSource {
            pages: vec![page(&["a"], false)],
            details: HashMap::from([("a".to_string(), detail("a"))]),
            ..FakeSource::default()
        };
        let report = service(source, &MemoryStore::new(), false)
            .run(SyncOptions {
                process: Some(true),
            })
            .await
            .unwrap();

        // No outlet stock was seeded, so the adjustment fails to apply
        let processing = report.processing.unwrap();
        assert_eq!(processing.failed, 1);
        assert!(processing.errors[0].error.contains("no outlet stock"));
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let service = service(FakeSource::default(), &MemoryStore::new(), false);
        let _held = service.running.try_lock().unwrap();
        let err = service.run(SyncOptions::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning));
    }
}
