//! HTTP handlers for invoice and delivery chalan allocations

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::Operator;
use crate::services::allocation::{AllocationInput, AllocationService, Cancellation};
use crate::services::inward::CommandInput;
use crate::services::sales::SaleOutcome;
use crate::store::LedgerStore;
use crate::AppState;

/// Allocate part of a sale to an invoice
pub async fn allocate_to_invoice<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(sale_id): Path<Uuid>,
    Operator(operator): Operator,
    Json(input): Json<AllocationInput>,
) -> AppResult<Json<SaleOutcome>> {
    let outcome = AllocationService::new(state.store)
        .allocate_to_invoice(sale_id, input, operator)
        .await?;
    Ok(Json(outcome))
}

/// Allocate part of a sale to a delivery chalan
pub async fn allocate_to_dc<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(sale_id): Path<Uuid>,
    Operator(operator): Operator,
    Json(input): Json<AllocationInput>,
) -> AppResult<Json<SaleOutcome>> {
    let outcome = AllocationService::new(state.store)
        .allocate_to_dc(sale_id, input, operator)
        .await?;
    Ok(Json(outcome))
}

/// Cancel an invoice
pub async fn cancel_invoice<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(invoice_no): Path<String>,
    Operator(operator): Operator,
    Json(input): Json<CommandInput>,
) -> AppResult<Json<Cancellation>> {
    let cancellation = AllocationService::new(state.store)
        .cancel_invoice(&invoice_no, input, operator)
        .await?;
    Ok(Json(cancellation))
}

/// Cancel a delivery chalan
pub async fn cancel_dc<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(dc_no): Path<String>,
    Json(input): Json<CommandInput>,
) -> AppResult<Json<Cancellation>> {
    let cancellation = AllocationService::new(state.store)
        .cancel_dc(&dc_no, input)
        .await?;
    Ok(Json(cancellation))
}
