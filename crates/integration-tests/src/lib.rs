//! Integration test harness for Outlet Stock.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p outlet-stock-integration-tests
//!
//! # Also exercise the PostgreSQL store (the database is migrated first)
//! TEST_DATABASE_URL=postgres://localhost/outlet_stock_test \
//!     cargo test -p outlet-stock-integration-tests
//! ```
//!
//! [`TestContext`] serves the real router on an ephemeral port over the
//! in-memory store, with Zoho replaced by a `wiremock` server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use outlet_stock_api::config::{SyncConfig, ZohoConfig};
use outlet_stock_api::db::{MemoryStore, OutletStockStore};
use outlet_stock_api::models::{OutletStockItem, StockFilter, UpsertStockInput};
use outlet_stock_api::routes;
use outlet_stock_api::state::AppState;
use outlet_stock_api::zoho::ZohoClient;
use outlet_stock_core::{LocationModuleMap, Module, StockKind};

/// A running API backed by a mock Zoho and an in-memory store.
pub struct TestContext {
    pub client: reqwest::Client,
    pub base_url: String,
    pub zoho: MockServer,
    pub store: MemoryStore,
}

impl TestContext {
    /// Start the mock Zoho (with a working token endpoint) and the API.
    pub async fn new() -> Self {
        let zoho = MockServer::start().await;
        mount_token(&zoho).await;

        let store = MemoryStore::new();
        let client = ZohoClient::new(&zoho_config(&zoho)).unwrap();
        let shared = Arc::new(store.clone());
        let state = AppState::new(
            shared.clone(),
            shared,
            Arc::new(client),
            SyncConfig {
                request_delay: Duration::ZERO,
                max_pages: 10,
                process_after_sync: false,
                ..SyncConfig::default()
            },
            LocationModuleMap::default(),
        );

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let app = routes::app(state, None);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{addr}"),
            zoho,
            store,
        }
    }

    pub async fn get(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .unwrap();
        read(response).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> (reqwest::StatusCode, Value) {
        let mut request = self.client.post(format!("{}{path}", self.base_url));
        if let Some(body) = body {
            request = request.json(&body);
        }
        read(request.send().await.unwrap()).await
    }

    /// Add an outlet stock row.
    pub async fn stock(&self, module: &str, name: &str, item_id: &str, quantity: i64) {
        self.store
            .upsert_stock(&UpsertStockInput {
                module: Module::new(module),
                kind: StockKind::RawMaterial,
                name: name.to_string(),
                sku: None,
                zoho_item_id: Some(item_id.to_string()),
                quantity: Decimal::from(quantity),
                unit: Some("kg".to_string()),
            })
            .await
            .unwrap();
    }

    /// Current quantity of the stock row tracking `item_id` in `module`.
    pub async fn quantity(&self, module: &str, item_id: &str) -> Decimal {
        let items: Vec<OutletStockItem> = self
            .store
            .list_stock(&StockFilter {
                module: Some(Module::new(module)),
                kind: None,
            })
            .await
            .unwrap();
        items
            .into_iter()
            .find(|item| item.zoho_item_id.as_deref() == Some(item_id))
            .map(|item| item.quantity)
            .expect("stock row exists")
    }
}

async fn read(response: reqwest::Response) -> (reqwest::StatusCode, Value) {
    let status = response.status();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

/// Zoho settings pointing both domains at the mock server.
#[must_use]
pub fn zoho_config(server: &MockServer) -> ZohoConfig {
    ZohoConfig {
        organization_id: "600123".to_string(),
        client_id: "1000.CLIENT".to_string(),
        client_secret: SecretString::from("client-secret"),
        refresh_token: SecretString::from("1000.refresh"),
        api_base_url: Url::parse(&server.uri()).unwrap(),
        accounts_url: Url::parse(&server.uri()).unwrap(),
        per_page: 200,
    }
}

pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "1000.access",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

/// Serve one list page.
pub async fn mount_list_page(server: &MockServer, page: u32, summaries: &[Value], has_more: bool) {
    Mock::given(method("GET"))
        .and(path("/inventory/v1/inventoryadjustments"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "message": "success",
            "inventory_adjustments": summaries,
            "page_context": {"page": page, "per_page": 200, "has_more_page": has_more}
        })))
        .mount(server)
        .await;
}

/// Serve the detail of one adjustment.
pub async fn mount_detail(server: &MockServer, adjustment: &Value) {
    let id = adjustment["inventory_adjustment_id"].as_str().unwrap();
    Mock::given(method("GET"))
        .and(path(format!("/inventory/v1/inventoryadjustments/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "message": "success",
            "inventory_adjustment": adjustment
        })))
        .mount(server)
        .await;
}

/// Make the detail call for one adjustment fail.
pub async fn mount_detail_error(server: &MockServer, id: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/inventory/v1/inventoryadjustments/{id}")))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "code": 1002,
            "message": "Server error"
        })))
        .mount(server)
        .await;
}

/// A quantity adjustment at `location` with `(item_id, name, quantity)` lines.
#[must_use]
pub fn adjustment(id: &str, number: &str, location: &str, lines: &[(&str, &str, i64)]) -> Value {
    json!({
        "inventory_adjustment_id": id,
        "reference_number": number,
        "date": "2026-10-01",
        "reason": "Stocktake",
        "adjustment_type": "quantity",
        "status": "adjusted",
        "location_name": location,
        "line_items": lines
            .iter()
            .enumerate()
            .map(|(i, (item_id, name, quantity))| json!({
                "line_item_id": format!("{id}-{i}"),
                "item_id": item_id,
                "name": name,
                "quantity_adjusted": quantity,
                "unit": "kg"
            }))
            .collect::<Vec<_>>()
    })
}

/// The list-endpoint summary of an adjustment (no line items).
#[must_use]
pub fn summary(adjustment: &Value) -> Value {
    let mut summary = adjustment.clone();
    if let Some(object) = summary.as_object_mut() {
        object.remove("line_items");
    }
    summary
}
