//! HTTP handlers for sales

use axum::{
    extract::{Path, State},
    Json,
};
use shared::SaleStatus;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::Operator;
use crate::services::inward::CommandInput;
use crate::services::sales::{RecordSaleInput, ReverseSaleInput, SaleOutcome, SalesService};
use crate::store::LedgerStore;
use crate::AppState;

/// List sales with their invoice and DC allocation status
pub async fn list_sales<S: LedgerStore>(
    State(state): State<AppState<S>>,
) -> AppResult<Json<Vec<SaleStatus>>> {
    let sales = SalesService::new(state.store).sales_with_status().await?;
    Ok(Json(sales))
}

/// Record a sale against a variant
pub async fn record_sale<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Operator(operator): Operator,
    Json(input): Json<RecordSaleInput>,
) -> AppResult<Json<SaleOutcome>> {
    let outcome = SalesService::new(state.store)
        .record_sale(input, operator)
        .await?;
    Ok(Json(outcome))
}

/// Reverse part of a sale
pub async fn reverse_sale<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(sale_id): Path<Uuid>,
    Operator(operator): Operator,
    Json(input): Json<ReverseSaleInput>,
) -> AppResult<Json<SaleOutcome>> {
    let outcome = SalesService::new(state.store)
        .reverse_sale(sale_id, input, operator)
        .await?;
    Ok(Json(outcome))
}

/// Delete an uninvoiced sale
pub async fn delete_sale<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(sale_id): Path<Uuid>,
    Json(input): Json<CommandInput>,
) -> AppResult<Json<SaleStatus>> {
    let status = SalesService::new(state.store)
        .delete_sale_permanently(sale_id, input)
        .await?;
    Ok(Json(status))
}
