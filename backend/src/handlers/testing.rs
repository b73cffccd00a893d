//! HTTP handlers for lot inspection

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::Operator;
use crate::services::stock::VariantState;
use crate::services::testing::{CompleteTestingInput, TestingService};
use crate::store::LedgerStore;
use crate::AppState;

/// Release inspected units of a variant
pub async fn complete_testing<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(variant_id): Path<Uuid>,
    Operator(operator): Operator,
    Json(input): Json<CompleteTestingInput>,
) -> AppResult<Json<VariantState>> {
    let service = TestingService::new(state.store);
    let variant = service
        .complete_testing(variant_id, input, operator)
        .await?;
    Ok(Json(variant))
}
