//! Application state shared across handlers.

use std::sync::Arc;

use outlet_stock_core::LocationModuleMap;

use crate::config::SyncConfig;
use crate::db::{AdjustmentStore, OutletStockStore};
use crate::services::{ProcessingService, SyncService};
use crate::zoho::AdjustmentSource;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    adjustments: Arc<dyn AdjustmentStore>,
    stock: Arc<dyn OutletStockStore>,
    sync: SyncService,
    processing: ProcessingService,
}

impl AppState {
    /// Wire the services over the given stores and Zoho source.
    #[must_use]
    pub fn new(
        adjustments: Arc<dyn AdjustmentStore>,
        stock: Arc<dyn OutletStockStore>,
        source: Arc<dyn AdjustmentSource>,
        sync_config: SyncConfig,
        modules: LocationModuleMap,
    ) -> Self {
        let processing = ProcessingService::new(Arc::clone(&adjustments), modules)
            .with_claim_timeout(sync_config.claim_timeout);
        let sync = SyncService::new(
            source,
            Arc::clone(&adjustments),
            processing.clone(),
            sync_config,
        );

        Self {
            inner: Arc::new(AppStateInner {
                adjustments,
                stock,
                sync,
                processing,
            }),
        }
    }

    pub fn adjustments(&self) -> &dyn AdjustmentStore {
        self.inner.adjustments.as_ref()
    }

    pub fn stock(&self) -> &dyn OutletStockStore {
        self.inner.stock.as_ref()
    }

    pub fn sync(&self) -> &SyncService {
        &self.inner.sync
    }

    pub fn processing(&self) -> &ProcessingService {
        &self.inner.processing
    }
}
