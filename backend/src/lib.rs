//! Inventory Ledger backend
//!
//! HTTP service over the stock ledger: receipts grouped into inward
//! documents, lot inspection, production withdrawals, sales and their
//! invoice / delivery chalan allocations, all recorded per lot with an
//! append-only movement ledger.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use external::PartCatalog;
use store::LedgerStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState<S: LedgerStore> {
    pub store: S,
    pub catalog: Arc<dyn PartCatalog>,
    pub config: Arc<Config>,
}

impl<S: LedgerStore> AppState<S> {
    pub fn new(store: S, catalog: Arc<dyn PartCatalog>, config: Config) -> Self {
        Self {
            store,
            catalog,
            config: Arc::new(config),
        }
    }
}

/// Create the application router with all routes and middleware
pub fn create_app<S: LedgerStore>(state: AppState<S>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", routes::api_routes::<S>())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Inventory Ledger API v1"
}

/// Liveness check
async fn health_check() -> &'static str {
    "OK"
}
