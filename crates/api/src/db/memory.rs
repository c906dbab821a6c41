//! In-process store.
//!
//! Mirrors the `PostgreSQL` store's semantics (unique keys, claim guard,
//! all-or-nothing delta application) behind a single async mutex. Used by
//! tests and by the API binary when `DATABASE_URL=memory://`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use outlet_stock_core::{
    AdjustmentId, OutletStockId, ProcessingStatus, StockKind, SyncStatus,
};

use super::{
    AdjustmentStore, ApplyError, OutletStockStore, RepositoryError, STALE_CLAIM_ERROR,
};
use crate::models::{
    AdjustmentFilter, AppliedLine, InventoryAdjustment, NewAdjustment, OutletStockItem,
    StockDelta, StockFilter, SyncFailure, UpsertOutcome, UpsertStockInput,
};

/// In-memory adjustment and outlet stock store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    last_adjustment_id: i32,
    adjustments: BTreeMap<AdjustmentId, InventoryAdjustment>,
    last_stock_id: i32,
    stock: BTreeMap<OutletStockId, OutletStockItem>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryInner {
    fn find_zoho(&self, zoho_adjustment_id: &str) -> Option<AdjustmentId> {
        self.adjustments
            .values()
            .find(|a| a.zoho_adjustment_id.as_deref() == Some(zoho_adjustment_id))
            .map(|a| a.id)
    }

    fn ensure_number_free(
        &self,
        adjustment_number: &str,
        owner: Option<AdjustmentId>,
    ) -> Result<(), RepositoryError> {
        let taken = self
            .adjustments
            .values()
            .any(|a| a.adjustment_number == adjustment_number && Some(a.id) != owner);
        if taken {
            return Err(RepositoryError::Conflict(format!(
                "adjustment number {adjustment_number} already belongs to another adjustment"
            )));
        }
        Ok(())
    }

    fn insert_adjustment(
        &mut self,
        new: &NewAdjustment,
        sync_status: SyncStatus,
        sync_error: Option<String>,
    ) -> Result<InventoryAdjustment, RepositoryError> {
        self.ensure_number_free(&new.adjustment_number, None)?;

        self.last_adjustment_id += 1;
        let now = Utc::now();
        let adjustment = InventoryAdjustment {
            id: AdjustmentId::new(self.last_adjustment_id),
            adjustment_number: new.adjustment_number.clone(),
            date: new.date,
            reason: new.reason.clone(),
            description: new.description.clone(),
            adjustment_type: new.adjustment_type,
            zoho_status: new.zoho_status.clone(),
            location_name: new.location_name.clone(),
            line_items: new.line_items.clone(),
            sync_status,
            sync_error,
            processing_status: ProcessingStatus::Pending,
            processing_error: None,
            zoho_adjustment_id: Some(new.zoho_adjustment_id.clone()),
            last_synced_at: Some(now),
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.adjustments.insert(adjustment.id, adjustment.clone());
        Ok(adjustment)
    }

    fn set_processing_outcome(
        &mut self,
        id: AdjustmentId,
        status: ProcessingStatus,
        message: &str,
    ) -> Option<InventoryAdjustment> {
        let adjustment = self.adjustments.get_mut(&id)?;
        if adjustment.processing_status != ProcessingStatus::Processing {
            return None;
        }
        adjustment.processing_status = status;
        adjustment.processing_error = Some(message.to_string());
        adjustment.updated_at = Utc::now();
        Some(adjustment.clone())
    }

    /// Stock row a delta applies to: item id, then SKU, then name.
    fn matching_stock(&self, delta: &StockDelta) -> Option<OutletStockId> {
        let in_module = move || {
            self.stock
                .values()
                .filter(move |item| item.module == delta.module)
        };
        let preferred = |item: &&OutletStockItem| (kind_rank(item.kind), item.id);

        in_module()
            .find(|item| delta.matches_item_id(item))
            .or_else(|| in_module().filter(|item| delta.matches_sku(item)).min_by_key(preferred))
            .or_else(|| in_module().filter(|item| delta.matches_name(item)).min_by_key(preferred))
            .map(|item| item.id)
    }

    fn ensure_stock_keys_free(
        &self,
        input: &UpsertStockInput,
        owner: Option<OutletStockId>,
    ) -> Result<(), RepositoryError> {
        let name = input.name.trim().to_lowercase();
        let clash = self.stock.values().any(|item| {
            Some(item.id) != owner
                && item.module == input.module
                && ((item.kind == input.kind && item.name.to_lowercase() == name)
                    || (input.zoho_item_id.is_some() && item.zoho_item_id == input.zoho_item_id))
        });
        if clash {
            return Err(RepositoryError::Conflict(format!(
                "{} already exists in module {} under a different key",
                input.name, input.module
            )));
        }
        Ok(())
    }
}

const fn kind_rank(kind: StockKind) -> u8 {
    match kind {
        StockKind::RawMaterial => 0,
        StockKind::FinishedGood => 1,
    }
}

#[async_trait]
impl AdjustmentStore for MemoryStore {
    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: AdjustmentId,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        Ok(self.inner.lock().await.adjustments.get(&id).cloned())
    }

    async fn find_by_zoho_id(
        &self,
        zoho_adjustment_id: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .find_zoho(zoho_adjustment_id)
            .and_then(|id| inner.adjustments.get(&id).cloned()))
    }

    async fn find_by_number(
        &self,
        adjustment_number: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .await
            .adjustments
            .values()
            .find(|a| a.adjustment_number == adjustment_number)
            .cloned())
    }

    async fn list(
        &self,
        filter: &AdjustmentFilter,
    ) -> Result<(Vec<InventoryAdjustment>, i64), RepositoryError> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<&InventoryAdjustment> = inner
            .adjustments
            .values()
            .filter(|a| filter.matches(a))
            .collect();
        matching.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from(filter.offset).unwrap_or(0);
        let limit = usize::try_from(filter.limit).unwrap_or(0);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn upsert_synced(&self, new: &NewAdjustment) -> Result<UpsertOutcome, RepositoryError> {
        let mut inner = self.inner.lock().await;

        let Some(id) = inner.find_zoho(&new.zoho_adjustment_id) else {
            let created = inner.insert_adjustment(new, SyncStatus::Synced, None)?;
            return Ok(UpsertOutcome::Created(created));
        };

        inner.ensure_number_free(&new.adjustment_number, Some(id))?;
        let adjustment = inner
            .adjustments
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        let now = Utc::now();
        adjustment.adjustment_number.clone_from(&new.adjustment_number);
        adjustment.date = new.date;
        adjustment.reason.clone_from(&new.reason);
        adjustment.description.clone_from(&new.description);
        adjustment.adjustment_type = new.adjustment_type;
        adjustment.zoho_status.clone_from(&new.zoho_status);
        adjustment.location_name.clone_from(&new.location_name);
        adjustment.line_items.clone_from(&new.line_items);
        adjustment.sync_status = SyncStatus::Synced;
        adjustment.sync_error = None;
        adjustment.last_synced_at = Some(now);
        adjustment.updated_at = now;
        Ok(UpsertOutcome::Updated(adjustment.clone()))
    }

    async fn record_sync_failure(
        &self,
        failure: &SyncFailure,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        let mut inner = self.inner.lock().await;

        if let Some(id) = inner.find_zoho(&failure.zoho_adjustment_id) {
            let adjustment = inner
                .adjustments
                .get_mut(&id)
                .ok_or(RepositoryError::NotFound)?;
            let now = Utc::now();
            adjustment.sync_status = SyncStatus::SyncFailed;
            adjustment.sync_error = Some(failure.error.clone());
            adjustment.last_synced_at = Some(now);
            adjustment.updated_at = now;
            return Ok(Some(adjustment.clone()));
        }

        match failure.placeholder.as_ref() {
            Some(placeholder) => inner
                .insert_adjustment(
                    placeholder,
                    SyncStatus::SyncFailed,
                    Some(failure.error.clone()),
                )
                .map(Some),
            None => Ok(None),
        }
    }

    async fn claimable_ids(&self) -> Result<Vec<AdjustmentId>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut claimable: Vec<&InventoryAdjustment> = inner
            .adjustments
            .values()
            .filter(|a| a.sync_status == SyncStatus::Synced && a.processing_status.is_claimable())
            .collect();
        claimable.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(claimable.into_iter().map(|a| a.id).collect())
    }

    async fn claim(
        &self,
        id: AdjustmentId,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let Some(adjustment) = inner.adjustments.get_mut(&id) else {
            return Ok(None);
        };
        if adjustment.sync_status != SyncStatus::Synced
            || !adjustment.processing_status.is_claimable()
        {
            return Ok(None);
        }
        adjustment.processing_status = ProcessingStatus::Processing;
        adjustment.processing_error = None;
        adjustment.updated_at = Utc::now();
        Ok(Some(adjustment.clone()))
    }

    async fn release_stale_claims(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut released = 0;
        for adjustment in inner.adjustments.values_mut().filter(|a| {
            a.processing_status == ProcessingStatus::Processing && a.updated_at <= cutoff
        }) {
            adjustment.processing_status = ProcessingStatus::Failed;
            adjustment.processing_error = Some(STALE_CLAIM_ERROR.to_string());
            adjustment.updated_at = now;
            released += 1;
        }
        Ok(released)
    }

    async fn apply_deltas(
        &self,
        id: AdjustmentId,
        deltas: &[StockDelta],
    ) -> Result<Vec<AppliedLine>, ApplyError> {
        let mut inner = self.inner.lock().await;

        let claimed = inner
            .adjustments
            .get(&id)
            .is_some_and(|a| a.processing_status == ProcessingStatus::Processing);
        if !claimed {
            return Err(ApplyError::NotClaimed(id));
        }

        // Work on a copy so a missing stock row leaves everything untouched
        let mut stock = inner.stock.clone();
        let mut applied = Vec::with_capacity(deltas.len());
        let now = Utc::now();

        for delta in deltas {
            let stock_id = inner
                .matching_stock(delta)
                .ok_or_else(|| ApplyError::StockNotFound {
                    line: delta.line_index + 1,
                    module: delta.module.clone(),
                    item: delta.describe(),
                })?;
            let item = stock
                .get_mut(&stock_id)
                .ok_or(ApplyError::Repository(RepositoryError::NotFound))?;

            let previous_quantity = item.quantity;
            item.quantity += delta.quantity;
            item.updated_at = now;

            applied.push(AppliedLine {
                adjustment_id: id,
                line_index: delta.line_index,
                stock_id,
                module: delta.module.clone(),
                name: item.name.clone(),
                delta: delta.quantity,
                previous_quantity,
                new_quantity: item.quantity,
            });
        }

        inner.stock = stock;
        if let Some(adjustment) = inner.adjustments.get_mut(&id) {
            adjustment.processing_status = ProcessingStatus::Processed;
            adjustment.processing_error = None;
            adjustment.processed_at = Some(now);
            adjustment.updated_at = now;
        }
        Ok(applied)
    }

    async fn mark_failed(
        &self,
        id: AdjustmentId,
        error: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .await
            .set_processing_outcome(id, ProcessingStatus::Failed, error))
    }

    async fn mark_skipped(
        &self,
        id: AdjustmentId,
        reason: &str,
    ) -> Result<Option<InventoryAdjustment>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .await
            .set_processing_outcome(id, ProcessingStatus::Skipped, reason))
    }
}

#[async_trait]
impl OutletStockStore for MemoryStore {
    async fn list_stock(
        &self,
        filter: &StockFilter,
    ) -> Result<Vec<OutletStockItem>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut items: Vec<OutletStockItem> = inner
            .stock
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.module
                .cmp(&b.module)
                .then(kind_rank(a.kind).cmp(&kind_rank(b.kind)))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(items)
    }

    async fn get_stock(
        &self,
        id: OutletStockId,
    ) -> Result<Option<OutletStockItem>, RepositoryError> {
        Ok(self.inner.lock().await.stock.get(&id).cloned())
    }

    async fn upsert_stock(
        &self,
        input: &UpsertStockInput,
    ) -> Result<OutletStockItem, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let name = input.name.trim().to_string();
        let lowered = name.to_lowercase();

        let existing = inner
            .stock
            .values()
            .find(|item| {
                item.module == input.module
                    && match input.zoho_item_id.as_deref() {
                        Some(item_id) => item.zoho_item_id.as_deref() == Some(item_id),
                        None => item.kind == input.kind && item.name.to_lowercase() == lowered,
                    }
            })
            .map(|item| item.id);

        inner.ensure_stock_keys_free(input, existing)?;
        let now = Utc::now();

        let id = existing.unwrap_or_else(|| {
            inner.last_stock_id += 1;
            OutletStockId::new(inner.last_stock_id)
        });
        let created_at = existing
            .and_then(|id| inner.stock.get(&id))
            .map_or(now, |item| item.created_at);

        let item = OutletStockItem {
            id,
            module: input.module.clone(),
            kind: input.kind,
            name,
            sku: input.sku.clone(),
            zoho_item_id: input.zoho_item_id.clone(),
            quantity: input.quantity,
            unit: input.unit.clone(),
            created_at,
            updated_at: now,
        };
        inner.stock.insert(id, item.clone());
        Ok(item)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use outlet_stock_core::{AdjustmentType, Module};

    use super::*;

    fn new_adjustment(zoho_id: &str, number: &str) -> NewAdjustment {
        NewAdjustment {
            zoho_adjustment_id: zoho_id.to_string(),
            adjustment_number: number.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            reason: Some("Spoilage".to_string()),
            description: None,
            adjustment_type: AdjustmentType::Quantity,
            zoho_status: Some("adjusted".to_string()),
            location_name: Some("Downtown Outlet".to_string()),
            line_items: vec![],
        }
    }

    fn stock_input(name: &str, quantity: i64) -> UpsertStockInput {
        UpsertStockInput {
            module: Module::new("downtown"),
            kind: StockKind::RawMaterial,
            name: name.to_string(),
            sku: None,
            zoho_item_id: None,
            quantity: Decimal::from(quantity),
            unit: Some("kg".to_string()),
        }
    }

    fn delta(name: &str, quantity: i64) -> StockDelta {
        StockDelta {
            line_index: 0,
            module: Module::new("downtown"),
            item_id: None,
            sku: None,
            name: name.to_string(),
            quantity: Decimal::from(quantity),
        }
    }

    #[tokio::test]
    async fn test_upsert_synced_creates_then_updates() {
        let store = MemoryStore::new();
        let first = store.upsert_synced(&new_adjustment("z1", "ADJ-1")).await.unwrap();
        assert!(matches!(first, UpsertOutcome::Created(_)));

        let mut changed = new_adjustment("z1", "ADJ-1");
        changed.reason = Some("Breakage".to_string());
        let second = store.upsert_synced(&changed).await.unwrap();
        assert!(matches!(second, UpsertOutcome::Updated(_)));
        assert_eq!(second.adjustment().reason.as_deref(), Some("Breakage"));
        assert_eq!(second.adjustment().id, first.adjustment().id);
    }

    #[tokio::test]
    async fn test_adjustment_number_is_unique() {
        let store = MemoryStore::new();
        store.upsert_synced(&new_adjustment("z1", "ADJ-1")).await.unwrap();
        let err = store
            .upsert_synced(&new_adjustment("z2", "ADJ-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = MemoryStore::new();
        let id = store
            .upsert_synced(&new_adjustment("z1", "ADJ-1"))
            .await
            .unwrap()
            .adjustment()
            .id;

        assert!(store.claim(id).await.unwrap().is_some());
        assert!(store.claim(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_stale_claims_only_touches_old_claims() {
        let store = MemoryStore::new();
        let id = store
            .upsert_synced(&new_adjustment("z1", "ADJ-1"))
            .await
            .unwrap()
            .adjustment()
            .id;
        let claimed_at = store.claim(id).await.unwrap().unwrap().updated_at;

        let before = claimed_at - chrono::TimeDelta::seconds(1);
        assert_eq!(store.release_stale_claims(before).await.unwrap(), 0);
        assert_eq!(
            store.find_by_id(id).await.unwrap().unwrap().processing_status,
            ProcessingStatus::Processing
        );

        assert_eq!(store.release_stale_claims(claimed_at).await.unwrap(), 1);
        let released = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(released.processing_status, ProcessingStatus::Failed);
        assert_eq!(released.processing_error.as_deref(), Some(STALE_CLAIM_ERROR));
        assert!(store.claim(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_apply_deltas_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.upsert_stock(&stock_input("Flour", 10)).await.unwrap();
        let id = store
            .upsert_synced(&new_adjustment("z1", "ADJ-1"))
            .await
            .unwrap()
            .adjustment()
            .id;
        store.claim(id).await.unwrap();

        let mut missing = delta("Saffron", 1);
        missing.line_index = 1;
        let err = store
            .apply_deltas(id, &[delta("Flour", -3), missing])
            .await
            .unwrap_err();
        assert!(matches!(err, ApplyError::StockNotFound { line: 2, .. }));

        let stock = store.list_stock(&StockFilter::default()).await.unwrap();
        assert_eq!(stock[0].quantity, Decimal::from(10));

        let applied = store.apply_deltas(id, &[delta("flour", -3)]).await.unwrap();
        assert_eq!(applied[0].previous_quantity, Decimal::from(10));
        assert_eq!(applied[0].new_quantity, Decimal::from(7));

        let adjustment = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(adjustment.processing_status, ProcessingStatus::Processed);
        assert!(adjustment.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_apply_requires_claim() {
        let store = MemoryStore::new();
        let id = store
            .upsert_synced(&new_adjustment("z1", "ADJ-1"))
            .await
            .unwrap()
            .adjustment()
            .id;
        let err = store.apply_deltas(id, &[]).await.unwrap_err();
        assert!(matches!(err, ApplyError::NotClaimed(_)));
    }

    #[tokio::test]
    async fn test_upsert_stock_replaces_by_name() {
        let store = MemoryStore::new();
        let first = store.upsert_stock(&stock_input("Flour", 10)).await.unwrap();
        let second = store.upsert_stock(&stock_input("FLOUR", 25)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, Decimal::from(25));
        assert_eq!(store.list_stock(&StockFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_prefers_local_id_then_zoho_then_number() {
        let store = MemoryStore::new();
        store.upsert_synced(&new_adjustment("4815000000044100", "REF-9")).await.unwrap();

        let by_id = store.resolve("1").await.unwrap().unwrap();
        let by_zoho = store.resolve("4815000000044100").await.unwrap().unwrap();
        let by_number = store.resolve("REF-9").await.unwrap().unwrap();
        assert_eq!(by_id.id, by_zoho.id);
        assert_eq!(by_zoho.id, by_number.id);
        assert!(store.resolve("nope").await.unwrap().is_none());
    }
}
