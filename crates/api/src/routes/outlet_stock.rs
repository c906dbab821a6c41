//! Read-only outlet stock endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    routing::get,
};
use serde::Deserialize;

use outlet_stock_core::{Module, OutletStockId, StockKind};

use super::envelope::ApiResponse;
use crate::error::AppError;
use crate::models::{OutletStockItem, StockFilter};
use crate::state::AppState;

/// Build the outlet stock router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/outlet-stock", get(list_stock))
        .route("/api/outlet-stock/{id}", get(get_stock))
}

#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    pub module: Option<String>,
    pub kind: Option<StockKind>,
}

async fn list_stock(
    State(state): State<AppState>,
    query: Result<Query<StockQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<OutletStockItem>>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let filter = StockFilter {
        module: query
            .module
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .map(Module::new),
        kind: query.kind,
    };

    let items = state.stock().list_stock(&filter).await?;
    let message = format!("Retrieved {} outlet stock items", items.len());
    Ok(ApiResponse::ok(message, items))
}

async fn get_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OutletStockItem>>, AppError> {
    let id: i32 = id
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid outlet stock id: {id}")))?;

    let item = state
        .stock()
        .get_stock(OutletStockId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("outlet stock {id}")))?;
    Ok(ApiResponse::ok("Outlet stock item retrieved", item))
}
