//! HTTP handlers for the part catalog

use axum::{extract::State, http::StatusCode};

use crate::error::AppResult;
use crate::store::LedgerStore;
use crate::AppState;

/// Drop the cached part master so the next receipt reads it again
pub async fn reload_catalog<S: LedgerStore>(
    State(state): State<AppState<S>>,
) -> AppResult<StatusCode> {
    state.catalog.reload().await?;
    tracing::info!("Part catalog reloaded");
    Ok(StatusCode::NO_CONTENT)
}
