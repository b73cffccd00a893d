//! HTTP handlers for stock queries

use axum::{
    extract::{Path, State},
    Json,
};
use shared::{LedgerAudit, Movement, Stock, VariantView};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::stock::StockService;
use crate::store::LedgerStore;
use crate::AppState;

/// List all stocks
pub async fn list_stocks<S: LedgerStore>(
    State(state): State<AppState<S>>,
) -> AppResult<Json<Vec<Stock>>> {
    let stocks = StockService::new(state.store).list_stocks().await?;
    Ok(Json(stocks))
}

/// Get the stock summary for a part number
pub async fn get_stock_summary<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(part_no): Path<String>,
) -> AppResult<Json<Stock>> {
    let stock = StockService::new(state.store)
        .get_stock_summary(&part_no)
        .await?;
    Ok(Json(stock))
}

/// Get the variants of a stock, oldest receipt first
pub async fn get_variants_for_stock<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(stock_id): Path<Uuid>,
) -> AppResult<Json<Vec<VariantView>>> {
    let variants = StockService::new(state.store)
        .variants_for_stock(stock_id)
        .await?;
    Ok(Json(variants))
}

/// Audit a stock against its movement ledger
pub async fn audit_stock<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(stock_id): Path<Uuid>,
) -> AppResult<Json<LedgerAudit>> {
    let report = StockService::new(state.store).audit(stock_id).await?;
    Ok(Json(report))
}

/// Movement history of a variant
pub async fn get_variant_movements<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(variant_id): Path<Uuid>,
) -> AppResult<Json<Vec<Movement>>> {
    let movements = StockService::new(state.store)
        .movements_for_variant(variant_id)
        .await?;
    Ok(Json(movements))
}
