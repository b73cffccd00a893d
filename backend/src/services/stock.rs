//! Stock aggregation and stock-level queries
//!
//! Reads that span a stock and its variants take the stock lock so they see
//! one consistent state.

use shared::{
    aggregate, audit, normalize_part_no, LedgerAudit, LedgerError, Movement, Stock, VariantView,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{LedgerStore, LedgerTx};

/// A variant together with its stock, as left by a command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantState {
    pub stock: Stock,
    pub variant: VariantView,
}

/// Recompute a locked stock from its variants and persist it.
///
/// Called after every variant change, inside the transaction that made it.
pub async fn recompute_stock<X: LedgerTx>(tx: &mut X, stock: &mut Stock) -> AppResult<()> {
    let variants = tx.variants_of_stock(stock.id).await?;
    let totals = aggregate(&variants).ok_or_else(|| {
        AppError::validation("quantity", "Stock totals exceed the supported range")
    })?;
    stock.apply_totals(&totals);
    tx.save_stock(stock).await?;

    tracing::debug!(
        part_no = %stock.part_no,
        available = stock.available,
        in_use = stock.in_use,
        pending_testing = stock.pending_testing,
        average_cost = %stock.average_cost,
        "Stock recomputed"
    );
    Ok(())
}

/// Read-side access to stocks, their variants and movement history
#[derive(Clone)]
pub struct StockService<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> StockService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// All stocks ordered by part number
    pub async fn list_stocks(&self) -> AppResult<Vec<Stock>> {
        let mut tx = self.store.begin().await?;
        tx.list_stocks().await
    }

    /// Stock summary for a part number
    pub async fn get_stock_summary(&self, part_no: &str) -> AppResult<Stock> {
        let part_no = normalize_part_no(part_no);
        let mut tx = self.store.begin().await?;
        let stock = tx
            .lock_stock_by_part_no(&part_no)
            .await?
            .ok_or_else(|| LedgerError::not_found("Stock", &part_no))?;
        Ok(stock)
    }

    /// Variants of a stock, oldest receipt first
    pub async fn variants_for_stock(&self, stock_id: Uuid) -> AppResult<Vec<VariantView>> {
        let mut tx = self.store.begin().await?;
        tx.lock_stock(stock_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Stock", stock_id))?;
        let variants = tx.variants_of_stock(stock_id).await?;
        Ok(variants.into_iter().map(VariantView::from).collect())
    }

    /// Movement history of a variant, oldest first
    pub async fn movements_for_variant(&self, variant_id: Uuid) -> AppResult<Vec<Movement>> {
        let mut tx = self.store.begin().await?;
        tx.variant(variant_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Variant", variant_id))?;
        tx.movements_of_variant(variant_id).await
    }

    /// Check a stock against its variants and their movement ledger
    pub async fn audit(&self, stock_id: Uuid) -> AppResult<LedgerAudit> {
        let mut tx = self.store.begin().await?;
        let stock = tx
            .lock_stock(stock_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Stock", stock_id))?;

        let variants = tx.variants_of_stock(stock_id).await?;
        let mut movements = Vec::new();
        for v in &variants {
            movements.extend(tx.movements_of_variant(v.id).await?);
        }

        let report = audit(&stock, &variants, &movements);
        if !report.consistent {
            tracing::warn!(part_no = %stock.part_no, issues = ?report.issues, "Ledger audit failed");
        }
        Ok(report)
    }
}
