//! WebSocket and HTTP server for the invoice import coordinator.
//!
//! Clients hold a WebSocket open at `/ws` to request upload slots, cancel
//! imports and receive status pushes. Uploads land through
//! `PUT /stage/{bucket}/{key}`. Structured logging (tracing) and Prometheus
//! metrics are wired in.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, put};
use importer::{ImportContext, ImportCoordinator, TracingAuditPublisher};
use metrics_exporter_prometheus::PrometheusHandle;
use stage::InMemoryObjectStage;
use store::{InMemoryInvoiceStore, InMemoryTransactionStore, InvoiceStore, TransactionStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use state::AppState;
use ws::{ConnectionManager, WsNotifier};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/ws", get(ws::ws_handler))
        .route("/stage/{bucket}/{key}", put(routes::stage::upload))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the import coordinator over the given stores.
pub fn create_state(
    config: &Config,
    transactions: Arc<dyn TransactionStore>,
    invoices: Arc<dyn InvoiceStore>,
) -> Arc<AppState> {
    let stage = Arc::new(
        InMemoryObjectStage::new(config.stage_bucket.clone(), config.public_base_url.clone())
            .with_object_lifetime(config.stage_object_lifetime_secs),
    );
    let connections = Arc::new(ConnectionManager::new());

    let ctx = ImportContext::new(
        transactions,
        invoices,
        stage.clone(),
        Arc::new(WsNotifier::new(connections.clone())),
        Arc::new(TracingAuditPublisher),
    )
    .with_settings(config.import_settings());

    Arc::new(AppState {
        coordinator: Arc::new(ImportCoordinator::new(ctx)),
        connections,
        stage,
    })
}

/// Creates the default application state with in-memory stores.
pub fn create_default_state(config: &Config) -> Arc<AppState> {
    create_state(
        config,
        Arc::new(InMemoryTransactionStore::new()),
        Arc::new(InMemoryInvoiceStore::new()),
    )
}
