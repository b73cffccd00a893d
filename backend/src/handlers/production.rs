//! HTTP handlers for production withdrawals and returns

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::Operator;
use crate::services::production::{ProductionInput, ProductionService};
use crate::services::stock::VariantState;
use crate::store::LedgerStore;
use crate::AppState;

/// Withdraw available units of a variant to production
pub async fn withdraw_to_production<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(variant_id): Path<Uuid>,
    Operator(operator): Operator,
    Json(input): Json<ProductionInput>,
) -> AppResult<Json<VariantState>> {
    let service = ProductionService::new(state.store);
    let variant = service.withdraw(variant_id, input, operator).await?;
    Ok(Json(variant))
}

/// Return unclaimed production units to available
pub async fn return_from_production<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(variant_id): Path<Uuid>,
    Operator(operator): Operator,
    Json(input): Json<ProductionInput>,
) -> AppResult<Json<VariantState>> {
    let service = ProductionService::new(state.store);
    let variant = service.return_to_stock(variant_id, input, operator).await?;
    Ok(Json(variant))
}
