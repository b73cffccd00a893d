//! Invoice and delivery chalan allocations against sales
//!
//! The two ledgers are independent: each may claim up to the full sale
//! quantity. Only invoices move stock; a DC records paperwork.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use shared::{
    validate_document_no, Bucket, DcAllocation, Direction, DocumentKind, InvoiceAllocation,
    LedgerError, Movement, MovementContext, Operation, Quantity, ReferenceType, SaleStatus, Stock,
    VariantView,
};
use uuid::Uuid;

use super::inward::CommandInput;
use super::sales::{sale_status, SaleOutcome};
use super::stock::recompute_stock;
use super::CommandKey;
use crate::error::{AppError, AppResult};
use crate::store::{LedgerStore, LedgerTx};

/// Input for allocating part of a sale to an invoice or a DC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationInput {
    pub idempotency_key: Uuid,
    pub document_no: String,
    pub quantity: Quantity,
}

/// Result of cancelling every allocation of one invoice or DC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cancellation {
    pub document: DocumentKind,
    pub document_no: String,
    pub allocations_removed: usize,
    pub quantity: Quantity,
    pub sales: Vec<SaleStatus>,
}

/// Allocation service for invoices and delivery chalans
#[derive(Clone)]
pub struct AllocationService<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> AllocationService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Invoice part of a sale. Invoiced units leave the variant for good.
    pub async fn allocate_to_invoice(
        &self,
        sale_id: Uuid,
        input: AllocationInput,
        operator: Option<String>,
    ) -> AppResult<SaleOutcome> {
        self.allocate(sale_id, input, operator, DocumentKind::Invoice)
            .await
    }

    /// Record a delivery chalan against part of a sale
    pub async fn allocate_to_dc(
        &self,
        sale_id: Uuid,
        input: AllocationInput,
        operator: Option<String>,
    ) -> AppResult<SaleOutcome> {
        self.allocate(sale_id, input, operator, DocumentKind::DeliveryChalan)
            .await
    }

    async fn allocate(
        &self,
        sale_id: Uuid,
        input: AllocationInput,
        operator: Option<String>,
        document: DocumentKind,
    ) -> AppResult<SaleOutcome> {
        validate_document_no(&input.document_no)
            .map_err(|msg| AppError::validation("document_no", msg))?;
        let operation = match document {
            DocumentKind::Invoice => Operation::AllocateInvoice,
            DocumentKind::DeliveryChalan => Operation::AllocateDc,
        };

        let cmd = CommandKey::new(input.idempotency_key, operation, &(sale_id, &input))?;
        let mut tx = self.store.begin().await?;

        let stock = tx.lock_stock_for_sale(sale_id).await?;
        if let Some(outcome) = cmd.replay(&mut tx).await? {
            return Ok(outcome);
        }
        let mut stock = stock.ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        let sale = tx
            .sale(sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        let mut variant = tx
            .variant(sale.variant_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Variant", sale.variant_id))?;

        let status = sale_status(&mut tx, sale).await?;
        if let Err(err) = status.check_claim(document, input.quantity) {
            tracing::warn!(
                %sale_id,
                %document,
                requested = input.quantity,
                remaining = status.remaining(document),
                "Allocation rejected"
            );
            return Err(err.into());
        }

        let document_no = input.document_no.trim();
        match document {
            DocumentKind::Invoice => {
                variant.consume(input.quantity)?;
                let allocation = InvoiceAllocation::new(sale_id, document_no, input.quantity);
                tx.insert_invoice_allocation(&allocation).await?;
                tx.save_variant(&variant).await?;

                let ctx = MovementContext::new(ReferenceType::Invoice, input.idempotency_key)
                    .reference(allocation.id)
                    .operator(operator);
                let movement =
                    Movement::record(&variant, Bucket::InUse, Direction::Out, input.quantity, &ctx);
                tx.insert_movement(&movement).await?;
                recompute_stock(&mut tx, &mut stock).await?;
            }
            DocumentKind::DeliveryChalan => {
                let allocation = DcAllocation::new(sale_id, document_no, input.quantity);
                tx.insert_dc_allocation(&allocation).await?;
            }
        }

        let status = sale_status(&mut tx, status.sale).await?;
        let outcome = SaleOutcome {
            sale: Some(status),
            variant: VariantView::from(variant),
            stock,
        };
        cmd.remember(&mut tx, &outcome).await?;
        tx.commit().await?;

        tracing::info!(
            %sale_id,
            %document,
            %document_no,
            quantity = input.quantity,
            "Allocation recorded"
        );
        Ok(outcome)
    }

    /// Remove every allocation of an invoice and put its units back in use
    pub async fn cancel_invoice(
        &self,
        invoice_no: &str,
        input: CommandInput,
        operator: Option<String>,
    ) -> AppResult<Cancellation> {
        let cmd = CommandKey::new(
            input.idempotency_key,
            Operation::CancelInvoice,
            &(invoice_no, &input),
        )?;
        let mut tx = self.store.begin().await?;

        let seen = tx.invoice_allocations_by_invoice(invoice_no).await?;
        let sale_ids: BTreeSet<Uuid> = seen.iter().map(|a| a.sale_id).collect();
        let mut stocks = lock_stocks_of_sales(&mut tx, &sale_ids).await?;
        if let Some(cancellation) = cmd.replay(&mut tx).await? {
            return Ok(cancellation);
        }

        // Re-read under the stock locks
        let allocations: Vec<InvoiceAllocation> = tx
            .invoice_allocations_by_invoice(invoice_no)
            .await?
            .into_iter()
            .filter(|a| sale_ids.contains(&a.sale_id))
            .collect();
        if allocations.is_empty() {
            return Err(LedgerError::not_found("Invoice", invoice_no).into());
        }

        let mut per_sale: BTreeMap<Uuid, Quantity> = BTreeMap::new();
        for allocation in &allocations {
            *per_sale.entry(allocation.sale_id).or_default() += allocation.quantity;
            tx.delete_invoice_allocation(allocation.id).await?;
        }

        let mut sales = Vec::with_capacity(per_sale.len());
        for (sale_id, quantity) in &per_sale {
            let sale = tx
                .sale(*sale_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
            let mut variant = tx
                .variant(sale.variant_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("Variant", sale.variant_id))?;

            variant.reinstate(*quantity)?;
            tx.save_variant(&variant).await?;
            let ctx = MovementContext::new(ReferenceType::Invoice, input.idempotency_key)
                .reference(*sale_id)
                .operator(operator.clone());
            let movement = Movement::record(&variant, Bucket::InUse, Direction::In, *quantity, &ctx);
            tx.insert_movement(&movement).await?;

            sales.push(sale_status(&mut tx, sale).await?);
        }
        for stock in &mut stocks {
            recompute_stock(&mut tx, stock).await?;
        }

        let cancellation = Cancellation {
            document: DocumentKind::Invoice,
            document_no: invoice_no.to_string(),
            allocations_removed: allocations.len(),
            quantity: per_sale.values().sum(),
            sales,
        };
        cmd.remember(&mut tx, &cancellation).await?;
        tx.commit().await?;

        tracing::info!(
            %invoice_no,
            allocations = cancellation.allocations_removed,
            quantity = cancellation.quantity,
            "Invoice cancelled"
        );
        Ok(cancellation)
    }

    /// Remove every allocation of a delivery chalan
    pub async fn cancel_dc(&self, dc_no: &str, input: CommandInput) -> AppResult<Cancellation> {
        let cmd = CommandKey::new(input.idempotency_key, Operation::CancelDc, &(dc_no, &input))?;
        let mut tx = self.store.begin().await?;

        let seen = tx.dc_allocations_by_dc(dc_no).await?;
        let sale_ids: BTreeSet<Uuid> = seen.iter().map(|a| a.sale_id).collect();
        lock_stocks_of_sales(&mut tx, &sale_ids).await?;
        if let Some(cancellation) = cmd.replay(&mut tx).await? {
            return Ok(cancellation);
        }

        let allocations: Vec<DcAllocation> = tx
            .dc_allocations_by_dc(dc_no)
            .await?
            .into_iter()
            .filter(|a| sale_ids.contains(&a.sale_id))
            .collect();
        if allocations.is_empty() {
            return Err(LedgerError::not_found("DeliveryChalan", dc_no).into());
        }

        for allocation in &allocations {
            tx.delete_dc_allocation(allocation.id).await?;
        }

        let mut sales = Vec::with_capacity(sale_ids.len());
        for sale_id in &sale_ids {
            if let Some(sale) = tx.sale(*sale_id).await? {
                sales.push(sale_status(&mut tx, sale).await?);
            }
        }

        let cancellation = Cancellation {
            document: DocumentKind::DeliveryChalan,
            document_no: dc_no.to_string(),
            allocations_removed: allocations.len(),
            quantity: allocations.iter().map(|a| a.quantity).sum(),
            sales,
        };
        cmd.remember(&mut tx, &cancellation).await?;
        tx.commit().await?;

        tracing::info!(
            %dc_no,
            allocations = cancellation.allocations_removed,
            quantity = cancellation.quantity,
            "Delivery chalan cancelled"
        );
        Ok(cancellation)
    }
}

/// Lock the stocks behind a set of sales in ascending id order
async fn lock_stocks_of_sales<X: LedgerTx>(
    tx: &mut X,
    sale_ids: &BTreeSet<Uuid>,
) -> AppResult<Vec<Stock>> {
    let mut stock_ids = BTreeSet::new();
    for sale_id in sale_ids {
        if let Some(stock_id) = tx.sale_stock_id(*sale_id).await? {
            stock_ids.insert(stock_id);
        }
    }

    let mut stocks = Vec::with_capacity(stock_ids.len());
    for stock_id in stock_ids {
        if let Some(stock) = tx.lock_stock(stock_id).await? {
            stocks.push(stock);
        }
    }
    Ok(stocks)
}
