//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::store::LedgerStore;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
    pub environment: String,
}

/// Health check endpoint handler
pub async fn health_check<S: LedgerStore>(State(state): State<AppState<S>>) -> Json<HealthResponse> {
    let store_status = if state.store.ping().await {
        "connected"
    } else {
        "disconnected"
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_status.to_string(),
        environment: state.config.environment.clone(),
    })
}
