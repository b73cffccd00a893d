//! HTTP handlers for inward documents and receipts

use axum::{
    extract::{Path, State},
    Json,
};
use shared::InwardDocumentView;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::inward::{CommandInput, CreateInwardInput, InwardService, ReceiveInput};
use crate::services::stock::VariantState;
use crate::store::LedgerStore;
use crate::AppState;

fn service<S: LedgerStore>(state: AppState<S>) -> InwardService<S> {
    InwardService::new(state.store, state.catalog)
}

/// Open a draft inward document
pub async fn create_inward<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(input): Json<CreateInwardInput>,
) -> AppResult<Json<InwardDocumentView>> {
    let view = service(state).create(input).await?;
    Ok(Json(view))
}

/// Get an inward document with its lots
pub async fn get_inward<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(inward_id): Path<Uuid>,
) -> AppResult<Json<InwardDocumentView>> {
    let view = service(state).get(inward_id).await?;
    Ok(Json(view))
}

/// Delete a draft inward document and its untouched lots
pub async fn delete_inward<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(inward_id): Path<Uuid>,
    Json(input): Json<CommandInput>,
) -> AppResult<Json<InwardDocumentView>> {
    let view = service(state).delete_draft(inward_id, input).await?;
    Ok(Json(view))
}

/// Finalize an inward document
pub async fn finalize_inward<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(inward_id): Path<Uuid>,
    Json(input): Json<CommandInput>,
) -> AppResult<Json<InwardDocumentView>> {
    let view = service(state).finalize(inward_id, input).await?;
    Ok(Json(view))
}

/// Receive a lot into an inward document
pub async fn receive<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(inward_id): Path<Uuid>,
    Json(input): Json<ReceiveInput>,
) -> AppResult<Json<VariantState>> {
    let receipt = service(state).receive(inward_id, input).await?;
    Ok(Json(receipt))
}
