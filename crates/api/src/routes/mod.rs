//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                          - Liveness
//! GET  /health/ready                                    - Store connectivity
//!
//! # Inventory adjustments
//! POST /api/inventory-adjustments/sync                  - Pull adjustments from Zoho
//! GET  /api/inventory-adjustments                       - Paginated, filterable list
//! GET  /api/inventory-adjustments/{id}                  - One adjustment
//! POST /api/inventory-adjustments/process/{id}          - Apply one adjustment
//! POST /api/inventory-adjustments/process-multiple      - Apply a list of adjustments
//! POST /api/inventory-adjustments/process-all-synced    - Apply every claimable adjustment
//! GET  /api/inventory-adjustments/status/{id}           - Sync/processing status
//!
//! # Outlet stock
//! GET  /api/outlet-stock?module=&kind=                  - Stock levels
//! GET  /api/outlet-stock/{id}                           - One stock row
//! ```

pub mod envelope;
pub mod health;
pub mod inventory_adjustments;
pub mod outlet_stock;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::request_id;
use crate::state::AppState;

/// All application routes, without middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(inventory_adjustments::router())
        .merge(outlet_stock::router())
}

/// The full application: routes, request tracing, request ids, and CORS.
///
/// Sentry layers are added by the binary.
pub fn app(state: AppState, cors_allowed_origin: Option<&str>) -> Router {
    let router = routes()
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        );

    let router = match cors_layer(cors_allowed_origin) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.with_state(state)
}

/// CORS for the dashboard origin. No layer (same-origin only) when unset or
/// invalid.
fn cors_layer(origin: Option<&str>) -> Option<CorsLayer> {
    let origin = origin.map(str::trim).filter(|o| !o.is_empty())?;
    let Ok(value) = HeaderValue::from_str(origin) else {
        tracing::warn!(origin, "Ignoring invalid CORS_ALLOWED_ORIGIN");
        return None;
    };

    Some(
        CorsLayer::new()
            .allow_origin(value)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .expose_headers([header::HeaderName::from_static(
                request_id::REQUEST_ID_HEADER,
            )]),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use tower::ServiceExt;

    use outlet_stock_core::{AdjustmentType, LocationModuleMap, Module, StockKind};

    use super::*;
    use crate::config::SyncConfig;
    use crate::db::{AdjustmentStore, MemoryStore, OutletStockStore};
    use crate::models::{AdjustmentLine, NewAdjustment, UpsertStockInput};
    use crate::zoho::{AdjustmentPage, AdjustmentSource, ZohoAdjustment, ZohoError};

    /// Zoho source with no adjustments.
    struct EmptySource;

    #[async_trait]
    impl AdjustmentSource for EmptySource {
        async fn list_adjustments_page(&self, _page: u32) -> Result<AdjustmentPage, ZohoError> {
            Ok(AdjustmentPage::default())
        }

        async fn get_adjustment(&self, id: &str) -> Result<ZohoAdjustment, ZohoError> {
            Err(ZohoError::NotFound(id.to_string()))
        }
    }

    fn new_adjustment(zoho_id: &str, number: &str, quantity: i64) -> NewAdjustment {
        NewAdjustment {
            zoho_adjustment_id: zoho_id.to_string(),
            adjustment_number: number.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            reason: Some("Wastage".to_string()),
            description: None,
            adjustment_type: AdjustmentType::Quantity,
            zoho_status: Some("adjusted".to_string()),
            location_name: Some("Central Kitchen".to_string()),
            line_items: vec![AdjustmentLine {
                line_item_id: Some("L1".to_string()),
                item_id: Some("I-100".to_string()),
                sku: Some("FLOUR-25".to_string()),
                name: "Flour".to_string(),
                account_name: None,
                quantity: Decimal::from(quantity),
                unit: Some("kg".to_string()),
                location_name: None,
            }],
        }
    }

    async fn test_app() -> (Router, MemoryStore) {
        let store = MemoryStore::new();
        store
            .upsert_stock(&UpsertStockInput {
                module: Module::new("central_kitchen"),
                kind: StockKind::RawMaterial,
                name: "Flour".to_string(),
                sku: Some("FLOUR-25".to_string()),
                zoho_item_id: Some("I-100".to_string()),
                quantity: Decimal::from(50),
                unit: Some("kg".to_string()),
            })
            .await
            .unwrap();
        store
            .upsert_synced(&new_adjustment("4600000000001", "ADJ-00001", -5))
            .await
            .unwrap();

        let shared = Arc::new(store.clone());
        let state = AppState::new(
            shared.clone(),
            shared,
            Arc::new(EmptySource),
            SyncConfig {
                request_delay: std::time::Duration::ZERO,
                ..SyncConfig::default()
            },
            LocationModuleMap::default(),
        );
        (app(state, None), store)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header(header::CONTENT_TYPE, "application/json");
        }
        let request = request
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (app, _) = test_app().await;
        let (status, _) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", "/health/ready", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_returns_envelope_with_pagination() {
        let (app, _) = test_app().await;
        let (status, body) = send(
            &app,
            "GET",
            "/api/inventory-adjustments?page=1&perPage=10&syncStatus=synced",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["pagination"]["total"], 1);
        assert_eq!(body["data"]["pagination"]["perPage"], 10);
        assert_eq!(body["data"]["items"][0]["adjustmentNumber"], "ADJ-00001");
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_status() {
        let (app, _) = test_app().await;
        let (status, body) = send(
            &app,
            "GET",
            "/api/inventory-adjustments?processingStatus=bogus",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_get_resolves_zoho_id_and_number() {
        let (app, _) = test_app().await;
        for key in ["4600000000001", "ADJ-00001"] {
            let (status, body) =
                send(&app, "GET", &format!("/api/inventory-adjustments/{key}"), None).await;
            assert_eq!(status, StatusCode::OK, "key {key}");
            assert_eq!(body["data"]["zohoAdjustmentId"], "4600000000001");
        }

        let (status, body) = send(&app, "GET", "/api/inventory-adjustments/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_process_one_then_conflict_on_repeat() {
        let (app, store) = test_app().await;
        let uri = "/api/inventory-adjustments/process/ADJ-00001";

        let (status, body) = send(&app, "POST", uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["result"], "processed");
        assert_eq!(body["data"]["processingStatus"], "processed");

        let stock = store.list_stock(&Default::default()).await.unwrap();
        assert_eq!(stock[0].quantity, Decimal::from(45));

        let (status, body) = send(&app, "POST", uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["result"], "not_claimable");

        let stock = store.list_stock(&Default::default()).await.unwrap();
        assert_eq!(stock[0].quantity, Decimal::from(45));
    }

    #[tokio::test]
    async fn test_process_one_skips_without_touching_stock() {
        let (app, store) = test_app().await;
        let skippable = [
            NewAdjustment {
                adjustment_type: AdjustmentType::Value,
                ..new_adjustment("4600000000002", "ADJ-00002", -5)
            },
            NewAdjustment {
                zoho_status: Some("draft".to_string()),
                ..new_adjustment("4600000000003", "ADJ-00003", -5)
            },
            new_adjustment("4600000000004", "ADJ-00004", 0),
        ];

        for new in &skippable {
            store.upsert_synced(new).await.unwrap();
            let uri = format!(
                "/api/inventory-adjustments/process/{}",
                new.adjustment_number
            );
            let (status, body) = send(&app, "POST", &uri, None).await;
            assert_eq!(status, StatusCode::OK, "{}", new.adjustment_number);
            assert_eq!(body["success"], true);
            assert_eq!(body["data"]["result"], "skipped");
            assert_eq!(body["data"]["processingStatus"], "skipped");

            let stored = store
                .find_by_number(&new.adjustment_number)
                .await
                .unwrap()
                .unwrap();
            assert!(stored.processing_error.is_some());
        }

        let stock = store.list_stock(&Default::default()).await.unwrap();
        assert_eq!(stock[0].quantity, Decimal::from(50));
    }

    #[tokio::test]
    async fn test_process_one_unmapped_location_is_unprocessable() {
        let (app, store) = test_app().await;
        store
            .upsert_synced(&NewAdjustment {
                location_name: Some("Harbour Front".to_string()),
                ..new_adjustment("4600000000005", "ADJ-00005", -5)
            })
            .await
            .unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/api/inventory-adjustments/process/ADJ-00005",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["result"], "failed");
        assert_eq!(body["data"]["processingStatus"], "failed");

        let stock = store.list_stock(&Default::default()).await.unwrap();
        assert_eq!(stock[0].quantity, Decimal::from(50));
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (app, _) = test_app().await;
        let (status, body) =
            send(&app, "GET", "/api/inventory-adjustments/status/ADJ-00001", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["syncStatus"], "synced");
        assert_eq!(body["data"]["processingStatus"], "pending");
    }

    #[tokio::test]
    async fn test_process_multiple_validates_body() {
        let (app, _) = test_app().await;
        let uri = "/api/inventory-adjustments/process-multiple";

        let (status, _) = send(&app, "POST", uri, Some(r#"{"adjustmentIds": []}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "POST", uri, Some("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = send(
            &app,
            "POST",
            uri,
            Some(r#"{"adjustmentIds": ["ADJ-00001", "nope"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["processed"], 1);
        assert_eq!(body["data"]["failed"], 1);
        assert_eq!(body["data"]["errors"][0]["adjustmentId"], "nope");
    }

    #[tokio::test]
    async fn test_process_all_synced() {
        let (app, _) = test_app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/inventory-adjustments/process-all-synced",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["processed"], 1);
    }

    #[tokio::test]
    async fn test_sync_accepts_empty_and_json_bodies() {
        let (app, _) = test_app().await;
        let uri = "/api/inventory-adjustments/sync";

        let (status, body) = send(&app, "POST", uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["fetched"], 0);

        let (status, body) = send(&app, "POST", uri, Some(r#"{"process": true}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["processing"]["processed"], 1);

        let (status, _) = send(&app, "POST", uri, Some(r#"{"process": "yes"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_outlet_stock_routes() {
        let (app, _) = test_app().await;
        let (status, body) =
            send(&app, "GET", "/api/outlet-stock?module=central_kitchen&kind=raw_material", None)
                .await;
        assert_eq!(status, StatusCode::OK);
        let items = body["data"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        let id = items[0]["id"].as_i64().unwrap();

        let (status, body) = send(&app, "GET", &format!("/api/outlet-stock/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Flour");

        let (status, _) = send(&app, "GET", "/api/outlet-stock/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, "GET", "/api/outlet-stock/9999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let (app, _) = test_app().await;
        let request = Request::builder()
            .uri("/health")
            .header(request_id::REQUEST_ID_HEADER, "req-123")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(request_id::REQUEST_ID_HEADER).unwrap(),
            "req-123"
        );
    }

    #[test]
    fn test_cors_layer_requires_valid_origin() {
        assert!(cors_layer(None).is_none());
        assert!(cors_layer(Some("  ")).is_none());
        assert!(cors_layer(Some("https://dashboard.example.com")).is_some());
    }
}
