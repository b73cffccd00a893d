//! Route definitions for the Inventory Ledger

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::{handlers, store::LedgerStore, AppState};

/// Create API routes
pub fn api_routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/health", get(handlers::health_check::<S>))
        .route("/catalog/reload", post(handlers::reload_catalog::<S>))
        .nest("/inward", inward_routes())
        .nest("/variants", variant_routes())
        .nest("/stocks", stock_routes())
        .nest("/sales", sales_routes())
        .route("/invoices/:invoice_no", delete(handlers::cancel_invoice::<S>))
        .route("/dcs/:dc_no", delete(handlers::cancel_dc::<S>))
}

/// Inward document routes
fn inward_routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/", post(handlers::create_inward::<S>))
        .route(
            "/:inward_id",
            get(handlers::get_inward::<S>).delete(handlers::delete_inward::<S>),
        )
        .route("/:inward_id/finalize", post(handlers::finalize_inward::<S>))
        .route("/:inward_id/receipts", post(handlers::receive::<S>))
}

/// Variant routes
fn variant_routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/:variant_id/testing", post(handlers::complete_testing::<S>))
        .route(
            "/:variant_id/withdrawals",
            post(handlers::withdraw_to_production::<S>),
        )
        .route(
            "/:variant_id/returns",
            post(handlers::return_from_production::<S>),
        )
        .route(
            "/:variant_id/movements",
            get(handlers::get_variant_movements::<S>),
        )
}

/// Stock routes
fn stock_routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/", get(handlers::list_stocks::<S>))
        .route("/by-part/:part_no", get(handlers::get_stock_summary::<S>))
        .route("/:stock_id/variants", get(handlers::get_variants_for_stock::<S>))
        .route("/:stock_id/audit", get(handlers::audit_stock::<S>))
}

/// Sales routes
fn sales_routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/",
            get(handlers::list_sales::<S>).post(handlers::record_sale::<S>),
        )
        .route("/:sale_id", delete(handlers::delete_sale::<S>))
        .route("/:sale_id/reversals", post(handlers::reverse_sale::<S>))
        .route(
            "/:sale_id/invoice-allocations",
            post(handlers::allocate_to_invoice::<S>),
        )
        .route(
            "/:sale_id/dc-allocations",
            post(handlers::allocate_to_dc::<S>),
        )
}
