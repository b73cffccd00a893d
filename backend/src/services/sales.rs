//! Sales: claiming production quantity for dispatch, and releasing it again
//!
//! A sale claims in-use units of one variant. Invoicing consumes claimed
//! units; everything claimed but not yet invoiced can be reversed back to
//! available stock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    trim_dc_allocations, validate_unit_price, Bucket, LedgerError, Movement, MovementContext,
    Operation, Quantity, ReferenceType, Sale, SaleStatus, Stock, VariantView,
};
use uuid::Uuid;

use super::inward::CommandInput;
use super::production::unassigned_in_use;
use super::stock::recompute_stock;
use super::CommandKey;
use crate::error::{AppError, AppResult};
use crate::store::{LedgerStore, LedgerTx};

/// Input for recording a sale against a variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSaleInput {
    pub idempotency_key: Uuid,
    pub variant_id: Uuid,
    pub quantity: Quantity,
    /// Defaults to the variant's receipt price
    pub unit_price: Option<Decimal>,
    /// Defaults to now
    pub sold_at: Option<DateTime<Utc>>,
}

/// Input for releasing part of a sale back to available stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseSaleInput {
    pub idempotency_key: Uuid,
    pub quantity: Quantity,
}

/// Outcome of a sale command: the sale (if it still exists), its variant
/// and the variant's stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleOutcome {
    pub sale: Option<SaleStatus>,
    pub variant: VariantView,
    pub stock: Stock,
}

/// Sales service
#[derive(Clone)]
pub struct SalesService<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> SalesService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Claim `quantity` units of a variant for its sale.
    ///
    /// Units already withdrawn to production and not claimed by the sale are
    /// used first; the rest is withdrawn from available stock.
    pub async fn record_sale(
        &self,
        input: RecordSaleInput,
        operator: Option<String>,
    ) -> AppResult<SaleOutcome> {
        if let Some(price) = input.unit_price {
            validate_unit_price(price).map_err(|msg| AppError::validation("unit_price", msg))?;
        }

        let cmd = CommandKey::new(input.idempotency_key, Operation::RecordSale, &input)?;
        let mut tx = self.store.begin().await?;

        let variant_id = input.variant_id;
        let stock = tx.lock_stock_for_variant(variant_id).await?;
        if let Some(outcome) = cmd.replay(&mut tx).await? {
            return Ok(outcome);
        }
        let mut stock = stock.ok_or_else(|| LedgerError::not_found("Variant", variant_id))?;
        let mut variant = tx
            .variant(variant_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Variant", variant_id))?;

        let unassigned = unassigned_in_use(&mut tx, &variant).await?;
        let claimable = unassigned + variant.available;
        if input.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity {
                entity: "Variant",
                id: variant_id,
                requested: input.quantity,
                limit: claimable,
            }
            .into());
        }
        if input.quantity > claimable {
            tracing::warn!(
                scan_code = %variant.scan_code,
                requested = input.quantity,
                claimable,
                "Sale rejected"
            );
            return Err(LedgerError::InsufficientQuantity {
                variant_id,
                requested: input.quantity,
                available: claimable,
            }
            .into());
        }

        let unit_price = input.unit_price.unwrap_or(variant.unit_price);
        let sold_at = input.sold_at.unwrap_or_else(Utc::now);
        let sale = match tx.sale_for_variant(variant_id).await? {
            Some(mut sale) => {
                sale.accumulate(input.quantity, unit_price, sold_at);
                tx.save_sale(&sale).await?;
                sale
            }
            None => {
                let sale = Sale::open(variant_id, stock.id, input.quantity, unit_price, sold_at);
                tx.insert_sale(&sale).await?;
                sale
            }
        };

        let shortfall = input.quantity - unassigned.min(input.quantity);
        if shortfall > 0 {
            variant.withdraw(shortfall)?;
            tx.save_variant(&variant).await?;

            let ctx = MovementContext::new(ReferenceType::Production, input.idempotency_key)
                .reference(sale.id)
                .operator(operator);
            for movement in
                Movement::transfer(&variant, Bucket::Available, Bucket::InUse, shortfall, &ctx)
            {
                tx.insert_movement(&movement).await?;
            }
            recompute_stock(&mut tx, &mut stock).await?;
        }

        let sale_id = sale.id;
        let status = sale_status(&mut tx, sale).await?;
        let outcome = SaleOutcome {
            sale: Some(status),
            variant: VariantView::from(variant),
            stock,
        };
        cmd.remember(&mut tx, &outcome).await?;
        tx.commit().await?;

        tracing::info!(
            %sale_id,
            scan_code = %outcome.variant.variant.scan_code,
            quantity = input.quantity,
            from_production = input.quantity - shortfall,
            from_available = shortfall,
            "Sale recorded"
        );
        Ok(outcome)
    }

    /// Return un-invoiced sold units to available stock.
    ///
    /// Delivery chalans beyond the reduced quantity are trimmed newest
    /// first. The sale is removed once nothing is left on it.
    pub async fn reverse_sale(
        &self,
        sale_id: Uuid,
        input: ReverseSaleInput,
        operator: Option<String>,
    ) -> AppResult<SaleOutcome> {
        let cmd =
            CommandKey::new(input.idempotency_key, Operation::ReverseSale, &(sale_id, &input))?;
        let mut tx = self.store.begin().await?;

        let stock = tx.lock_stock_for_sale(sale_id).await?;
        if let Some(outcome) = cmd.replay(&mut tx).await? {
            return Ok(outcome);
        }
        let mut stock = stock.ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        let mut sale = tx
            .sale(sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        let mut variant = tx
            .variant(sale.variant_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Variant", sale.variant_id))?;

        let invoices = tx.invoice_allocations(sale_id).await?;
        let dcs = tx.dc_allocations(sale_id).await?;
        let status = SaleStatus::new(sale.clone(), &invoices, &dcs);
        if let Err(err) = status.check_reversal(input.quantity) {
            tracing::warn!(
                %sale_id,
                requested = input.quantity,
                error = %err,
                "Sale reversal rejected"
            );
            return Err(err.into());
        }

        variant.restore(input.quantity)?;
        tx.save_variant(&variant).await?;
        let ctx = MovementContext::new(ReferenceType::SalesReturn, input.idempotency_key)
            .reference(sale_id)
            .operator(operator);
        for movement in
            Movement::transfer(&variant, Bucket::InUse, Bucket::Available, input.quantity, &ctx)
        {
            tx.insert_movement(&movement).await?;
        }

        sale.quantity -= input.quantity;
        sale.updated_at = Utc::now();
        let remaining_sale = if sale.quantity == 0 {
            for dc in &dcs {
                tx.delete_dc_allocation(dc.id).await?;
            }
            tx.delete_sale(sale_id).await?;
            None
        } else {
            for (dc_id, left) in trim_dc_allocations(&dcs, sale.quantity) {
                if left == 0 {
                    tx.delete_dc_allocation(dc_id).await?;
                } else if let Some(dc) = dcs.iter().find(|dc| dc.id == dc_id) {
                    let mut dc = dc.clone();
                    dc.quantity = left;
                    tx.save_dc_allocation(&dc).await?;
                }
            }
            tx.save_sale(&sale).await?;
            Some(sale_status(&mut tx, sale).await?)
        };
        recompute_stock(&mut tx, &mut stock).await?;

        let outcome = SaleOutcome {
            sale: remaining_sale,
            variant: VariantView::from(variant),
            stock,
        };
        cmd.remember(&mut tx, &outcome).await?;
        tx.commit().await?;

        tracing::info!(
            %sale_id,
            quantity = input.quantity,
            remaining = outcome.sale.as_ref().map(|s| s.sale.quantity).unwrap_or(0),
            "Sale reversed"
        );
        Ok(outcome)
    }

    /// Drop a sale that has never been invoiced, together with its delivery
    /// chalans. The units stay in production, unclaimed.
    pub async fn delete_sale_permanently(
        &self,
        sale_id: Uuid,
        input: CommandInput,
    ) -> AppResult<SaleStatus> {
        let cmd =
            CommandKey::new(input.idempotency_key, Operation::DeleteSale, &(sale_id, &input))?;
        let mut tx = self.store.begin().await?;

        let stock = tx.lock_stock_for_sale(sale_id).await?;
        if let Some(status) = cmd.replay(&mut tx).await? {
            return Ok(status);
        }
        stock.ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        let sale = tx
            .sale(sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;

        let invoices = tx.invoice_allocations(sale_id).await?;
        let dcs = tx.dc_allocations(sale_id).await?;
        let status = SaleStatus::new(sale, &invoices, &dcs);
        if status.invoiced_quantity > 0 {
            tracing::warn!(%sale_id, invoiced = status.invoiced_quantity, "Sale deletion rejected");
            return Err(LedgerError::InvoicedQuantity {
                sale_id,
                requested: status.sale.quantity,
                invoiced: status.invoiced_quantity,
            }
            .into());
        }

        for dc in &dcs {
            tx.delete_dc_allocation(dc.id).await?;
        }
        tx.delete_sale(sale_id).await?;

        cmd.remember(&mut tx, &status).await?;
        tx.commit().await?;

        tracing::info!(
            %sale_id,
            quantity = status.sale.quantity,
            delivery_chalans = dcs.len(),
            "Sale deleted, units left in production"
        );
        Ok(status)
    }

    /// Every sale with its invoiced and delivered totals, newest first
    pub async fn sales_with_status(&self) -> AppResult<Vec<SaleStatus>> {
        let mut tx = self.store.begin().await?;
        let sales = tx.list_sales().await?;
        let mut statuses = Vec::with_capacity(sales.len());
        for sale in sales {
            statuses.push(sale_status(&mut tx, sale).await?);
        }
        Ok(statuses)
    }
}

/// Load both claim ledgers of a sale
pub async fn sale_status<X: LedgerTx>(tx: &mut X, sale: Sale) -> AppResult<SaleStatus> {
    let invoices = tx.invoice_allocations(sale.id).await?;
    let dcs = tx.dc_allocations(sale.id).await?;
    Ok(SaleStatus::new(sale, &invoices, &dcs))
}
