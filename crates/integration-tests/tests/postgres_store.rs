//! `PgStore` against a real database.
//!
//! Skipped unless `TEST_DATABASE_URL` points at a disposable database. The
//! database is migrated and both tables are truncated first.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use secrecy::SecretString;

use outlet_stock_api::db::{self, AdjustmentStore, ApplyError, OutletStockStore, PgStore};
use outlet_stock_api::models::{
    AdjustmentFilter, AdjustmentLine, NewAdjustment, StockDelta, SyncFailure, UpsertOutcome,
    UpsertStockInput,
};
use outlet_stock_core::{AdjustmentType, Module, ProcessingStatus, StockKind, SyncStatus};

async fn store() -> Option<PgStore> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = db::create_pool(&SecretString::from(url)).await.unwrap();
    sqlx::migrate!("../api/migrations").run(&pool).await.unwrap();
    sqlx::query("TRUNCATE inventory_adjustments, outlet_stock RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();
    Some(PgStore::new(pool))
}

fn new_adjustment(zoho_id: &str, number: &str, lines: Vec<AdjustmentLine>) -> NewAdjustment {
    NewAdjustment {
        zoho_adjustment_id: zoho_id.to_string(),
        adjustment_number: number.to_string(),
        date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
        reason: Some("Stocktake".to_string()),
        description: None,
        adjustment_type: AdjustmentType::Quantity,
        zoho_status: Some("adjusted".to_string()),
        location_name: Some("Central Kitchen".to_string()),
        line_items: lines,
    }
}

fn line(item_id: &str, name: &str, quantity: i64) -> AdjustmentLine {
    AdjustmentLine {
        line_item_id: None,
        item_id: Some(item_id.to_string()),
        sku: None,
        name: name.to_string(),
        account_name: None,
        quantity: Decimal::from(quantity),
        unit: Some("kg".to_string()),
        location_name: None,
    }
}

fn delta(line_index: usize, item_id: &str, name: &str, quantity: i64) -> StockDelta {
    StockDelta {
        line_index,
        module: Module::new("central_kitchen"),
        item_id: Some(item_id.to_string()),
        sku: None,
        name: name.to_string(),
        quantity: Decimal::from(quantity),
    }
}

#[tokio::test]
async fn postgres_store_lifecycle() {
    let Some(store) = store().await else {
        return;
    };

    // Stock upsert is keyed by (module, zoho_item_id)
    let flour = store
        .upsert_stock(&UpsertStockInput {
            module: Module::new("central_kitchen"),
            kind: StockKind::RawMaterial,
            name: "Flour".to_string(),
            sku: None,
            zoho_item_id: Some("I-FLOUR".to_string()),
            quantity: Decimal::from(100),
            unit: Some("kg".to_string()),
        })
        .await
        .unwrap();
    let again = store
        .upsert_stock(&UpsertStockInput {
            module: Module::new("central_kitchen"),
            kind: StockKind::RawMaterial,
            name: "Flour (25kg)".to_string(),
            sku: None,
            zoho_item_id: Some("I-FLOUR".to_string()),
            quantity: Decimal::from(100),
            unit: Some("kg".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(flour.id, again.id);

    // Insert, then update in place
    let created = store
        .upsert_synced(&new_adjustment("46001", "ADJ-1", vec![line("I-FLOUR", "Flour", -10)]))
        .await
        .unwrap();
    assert!(matches!(created, UpsertOutcome::Created(_)));
    let updated = store
        .upsert_synced(&new_adjustment("46001", "ADJ-1", vec![line("I-FLOUR", "Flour", -10)]))
        .await
        .unwrap();
    assert!(matches!(updated, UpsertOutcome::Updated(_)));
    let id = updated.adjustment().id;

    // Numbers are unique across Zoho ids
    let conflict = store
        .upsert_synced(&new_adjustment("46002", "ADJ-1", vec![]))
        .await;
    assert!(matches!(
        conflict,
        Err(db::RepositoryError::Conflict(_))
    ));

    assert_eq!(store.resolve("ADJ-1").await.unwrap().unwrap().id, id);
    assert_eq!(store.resolve("46001").await.unwrap().unwrap().id, id);
    assert_eq!(store.resolve(&id.to_string()).await.unwrap().unwrap().id, id);

    // Claim is exclusive
    assert_eq!(store.claimable_ids().await.unwrap(), vec![id]);
    let claimed = store.claim(id).await.unwrap().unwrap();
    assert_eq!(claimed.processing_status, ProcessingStatus::Processing);
    assert!(store.claim(id).await.unwrap().is_none());

    // Abandoned claims are released back to failed
    let before = claimed.updated_at - chrono::TimeDelta::seconds(1);
    assert_eq!(store.release_stale_claims(before).await.unwrap(), 0);
    assert_eq!(
        store.release_stale_claims(claimed.updated_at).await.unwrap(),
        1
    );
    let released = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(released.processing_status, ProcessingStatus::Failed);
    assert_eq!(
        released.processing_error.as_deref(),
        Some(db::STALE_CLAIM_ERROR)
    );
    store.claim(id).await.unwrap().unwrap();

    // A missing stock row rolls everything back
    let result = store
        .apply_deltas(
            id,
            &[delta(0, "I-FLOUR", "Flour", -10), delta(1, "I-NONE", "Nothing", 1)],
        )
        .await;
    assert!(matches!(result, Err(ApplyError::StockNotFound { line: 2, .. })));
    let flour_now = store.get_stock(flour.id).await.unwrap().unwrap();
    assert_eq!(flour_now.quantity, Decimal::from(100));

    let applied = store
        .apply_deltas(id, &[delta(0, "I-FLOUR", "Flour", -10)])
        .await
        .unwrap();
    assert_eq!(applied[0].previous_quantity, Decimal::from(100));
    assert_eq!(applied[0].new_quantity, Decimal::from(90));

    let processed = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(processed.processing_status, ProcessingStatus::Processed);
    assert!(processed.processed_at.is_some());

    // Applying again without a claim writes nothing
    let again = store
        .apply_deltas(id, &[delta(0, "I-FLOUR", "Flour", -10)])
        .await;
    assert!(matches!(again, Err(ApplyError::NotClaimed(_))));
    let flour_now = store.get_stock(flour.id).await.unwrap().unwrap();
    assert_eq!(flour_now.quantity, Decimal::from(90));

    // Re-sync keeps the processing state
    store
        .upsert_synced(&new_adjustment("46001", "ADJ-1", vec![line("I-FLOUR", "Flour", -10)]))
        .await
        .unwrap();
    let resynced = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(resynced.processing_status, ProcessingStatus::Processed);

    // Sync failures insert a placeholder for unknown adjustments
    let failed = store
        .record_sync_failure(&SyncFailure {
            zoho_adjustment_id: "46003".to_string(),
            placeholder: Some(new_adjustment("46003", "ADJ-3", vec![])),
            error: "detail request failed".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.sync_status, SyncStatus::SyncFailed);
    assert!(store.claimable_ids().await.unwrap().is_empty());

    let (items, total) = store
        .list(&AdjustmentFilter {
            sync_status: Some(SyncStatus::SyncFailed),
            limit: 20,
            ..AdjustmentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].adjustment_number, "ADJ-3");

    let (_, total) = store
        .list(&AdjustmentFilter {
            search: Some("adj-".to_string()),
            limit: 20,
            ..AdjustmentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);

    // Backslashes in a search term match literally
    let (_, total) = store
        .list(&AdjustmentFilter {
            search: Some("\\ADJ".to_string()),
            limit: 20,
            ..AdjustmentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 0);
}
