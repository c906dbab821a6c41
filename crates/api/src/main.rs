//! Outlet Stock API server.
//!
//! Serves the inventory adjustment JSON API on port 3002.
//!
//! # Architecture
//!
//! - Axum web framework
//! - Zoho Inventory API as the source of adjustment records
//! - `PostgreSQL` for adjustments and outlet stock (`DATABASE_URL=memory://`
//!   runs against an in-process store)

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outlet_stock_api::config::ApiConfig;
use outlet_stock_api::db::{self, AdjustmentStore, MemoryStore, OutletStockStore, PgStore};
use outlet_stock_api::routes;
use outlet_stock_api::state::AppState;
use outlet_stock_api::zoho::ZohoClient;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ApiConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let config = ApiConfig::from_env().expect("Failed to load configuration");

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "outlet_stock_api=info,tower_http=debug".into());

    let json_layer = config
        .json_logs
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!config.json_logs).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let (adjustments, stock) = if config.uses_memory_store() {
        tracing::warn!("Using in-memory store; data is lost on shutdown");
        shared_stores(MemoryStore::new())
    } else {
        let pool = db::create_pool(&config.database_url)
            .await
            .expect("Failed to create database pool");
        tracing::info!("Database pool created");
        // NOTE: Migrations are NOT run automatically on startup.
        // Run them explicitly via: cargo run -p outlet-stock-cli -- migrate
        shared_stores(PgStore::new(pool))
    };

    let zoho = ZohoClient::new(&config.zoho).expect("Failed to create Zoho client");
    tracing::info!(
        organization_id = %config.zoho.organization_id,
        modules = config.location_modules.len(),
        "Zoho client configured"
    );

    let state = AppState::new(
        adjustments,
        stock,
        Arc::new(zoho),
        config.sync.clone(),
        config.location_modules.clone(),
    );

    let app = routes::app(state, config.cors_allowed_origin.as_deref())
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("outlet stock api listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// One store backing both the adjustment and outlet stock traits.
fn shared_stores<S>(store: S) -> (Arc<dyn AdjustmentStore>, Arc<dyn OutletStockStore>)
where
    S: AdjustmentStore + OutletStockStore + 'static,
{
    let store = Arc::new(store);
    (store.clone(), store)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
