//! Inventory adjustment sync and processing endpoints.
//!
//! `{id}` and `{adjustment_id}` accept a local id, a Zoho adjustment id, or
//! an adjustment number, tried in that order.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use outlet_stock_core::{ProcessingStatus, SyncStatus};

use super::envelope::{ApiResponse, Paginated, PaginationMeta, PaginationParams};
use crate::error::AppError;
use crate::models::{AdjustmentFilter, AdjustmentStatus, InventoryAdjustment};
use crate::services::{
    ProcessOutcome, ProcessReport, ProcessResult, SyncOptions, SyncReport,
};
use crate::state::AppState;

const MAX_BATCH_SIZE: usize = 500;

/// Build the inventory adjustments router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/inventory-adjustments", get(list_adjustments))
        .route("/api/inventory-adjustments/sync", post(sync_adjustments))
        .route(
            "/api/inventory-adjustments/process-multiple",
            post(process_multiple),
        )
        .route(
            "/api/inventory-adjustments/process-all-synced",
            post(process_all_synced),
        )
        .route(
            "/api/inventory-adjustments/process/{adjustment_id}",
            post(process_one),
        )
        .route(
            "/api/inventory-adjustments/status/{adjustment_id}",
            get(adjustment_status),
        )
        .route("/api/inventory-adjustments/{id}", get(get_adjustment))
}

/// Query parameters for the adjustment list.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sync_status: Option<SyncStatus>,
    pub processing_status: Option<ProcessingStatus>,
    /// Matches adjustment number, reason, or Zoho id.
    pub search: Option<String>,
}

/// Body of `POST /process-multiple`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMultipleRequest {
    pub adjustment_ids: Vec<AdjustmentKey>,
}

/// An adjustment key as sent by clients: a string or a bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AdjustmentKey {
    Number(i64),
    Text(String),
}

impl AdjustmentKey {
    fn into_key(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

/// Pull adjustments from Zoho.
///
/// The body is optional; `{"process": true}` applies them afterwards.
#[instrument(skip(state, body))]
async fn sync_adjustments(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ApiResponse<SyncReport>>, AppError> {
    let options = if body.iter().all(u8::is_ascii_whitespace) {
        SyncOptions::default()
    } else {
        serde_json::from_slice::<SyncOptions>(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid sync options: {e}")))?
    };

    let report = state.sync().run(options).await?;
    let message = format!(
        "Sync completed: {} fetched, {} created, {} updated, {} failed",
        report.fetched, report.created, report.updated, report.failed
    );
    Ok(ApiResponse::ok(message, report))
}

async fn list_adjustments(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Paginated<InventoryAdjustment>>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let params = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    };
    let filter = AdjustmentFilter {
        sync_status: query.sync_status,
        processing_status: query.processing_status,
        search: query
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        limit: params.limit(),
        offset: params.offset(),
    };

    let (items, total) = state.adjustments().list(&filter).await?;
    let message = format!("Retrieved {} of {total} inventory adjustments", items.len());
    Ok(ApiResponse::ok(
        message,
        Paginated {
            items,
            pagination: PaginationMeta::new(params, total),
        },
    ))
}

async fn get_adjustment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<InventoryAdjustment>>, AppError> {
    let adjustment = find(&state, &id).await?;
    Ok(ApiResponse::ok("Inventory adjustment retrieved", adjustment))
}

async fn adjustment_status(
    State(state): State<AppState>,
    Path(adjustment_id): Path<String>,
) -> Result<Json<ApiResponse<AdjustmentStatus>>, AppError> {
    let adjustment = find(&state, &adjustment_id).await?;
    Ok(ApiResponse::ok(
        "Inventory adjustment status retrieved",
        AdjustmentStatus::from(&adjustment),
    ))
}

/// Process one adjustment.
///
/// Processed and skipped adjustments return 200. A failed adjustment returns
/// 422 and one that cannot be claimed returns 409; both still carry the
/// outcome.
#[instrument(skip(state))]
async fn process_one(
    State(state): State<AppState>,
    Path(adjustment_id): Path<String>,
) -> Result<Response, AppError> {
    let outcome = state.processing().process(&adjustment_id).await?;
    Ok(outcome_response(outcome))
}

#[instrument(skip(state, body))]
async fn process_multiple(
    State(state): State<AppState>,
    body: Result<Json<ProcessMultipleRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ProcessReport>>, AppError> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let keys: Vec<String> = body
        .adjustment_ids
        .into_iter()
        .map(AdjustmentKey::into_key)
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return Err(AppError::BadRequest(
            "adjustmentIds must contain at least one id".to_string(),
        ));
    }
    if keys.len() > MAX_BATCH_SIZE {
        return Err(AppError::BadRequest(format!(
            "at most {MAX_BATCH_SIZE} adjustments can be processed per request"
        )));
    }

    let report = state.processing().process_many(&keys).await;
    Ok(ApiResponse::ok(report_message(&report), report))
}

#[instrument(skip(state))]
async fn process_all_synced(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ProcessReport>>, AppError> {
    let report = state.processing().process_all_synced().await?;
    Ok(ApiResponse::ok(report_message(&report), report))
}

async fn find(state: &AppState, key: &str) -> Result<InventoryAdjustment, AppError> {
    state
        .adjustments()
        .resolve(key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("inventory adjustment {key}")))
}

fn outcome_response(outcome: ProcessOutcome) -> Response {
    let detail = outcome.message.clone().unwrap_or_default();
    let number = outcome.adjustment_number.clone();
    let (status, success, message) = match outcome.result {
        ProcessResult::Processed => (
            StatusCode::OK,
            true,
            format!(
                "Inventory adjustment {number} processed ({} lines applied)",
                outcome.applied.len()
            ),
        ),
        ProcessResult::Skipped => (
            StatusCode::OK,
            true,
            format!("Inventory adjustment {number} skipped: {detail}"),
        ),
        ProcessResult::Failed => (
            StatusCode::UNPROCESSABLE_ENTITY,
            false,
            format!("Inventory adjustment {number} failed: {detail}"),
        ),
        ProcessResult::NotClaimable => (
            StatusCode::CONFLICT,
            false,
            format!(
                "Inventory adjustment {number} cannot be processed (processing status: {})",
                outcome.processing_status
            ),
        ),
    };

    (
        status,
        Json(ApiResponse {
            success,
            message,
            data: Some(outcome),
        }),
    )
        .into_response()
}

fn report_message(report: &ProcessReport) -> String {
    format!(
        "Processing completed: {} processed, {} skipped, {} failed, {} not claimable",
        report.processed, report.skipped, report.failed, report.not_claimable
    )
}
