//! Withdrawal of tested units into production and their return

use serde::{Deserialize, Serialize};
use shared::{
    Bucket, LedgerError, Movement, MovementContext, Operation, Quantity, ReferenceType,
    SaleStatus, Variant, VariantView,
};
use uuid::Uuid;

use super::stock::{recompute_stock, VariantState};
use super::CommandKey;
use crate::error::AppResult;
use crate::store::{LedgerStore, LedgerTx};

/// Input for moving units between available and in use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionInput {
    pub idempotency_key: Uuid,
    pub quantity: Quantity,
}

/// In-use units of a variant still claimed by its sale (sold but not yet invoiced)
pub async fn claimed_in_use<X: LedgerTx>(tx: &mut X, variant_id: Uuid) -> AppResult<Quantity> {
    let Some(sale) = tx.sale_for_variant(variant_id).await? else {
        return Ok(0);
    };
    let invoices = tx.invoice_allocations(sale.id).await?;
    Ok(SaleStatus::new(sale, &invoices, &[]).remaining_for_invoice)
}

/// In-use units of a variant that no sale claims
pub async fn unassigned_in_use<X: LedgerTx>(tx: &mut X, variant: &Variant) -> AppResult<Quantity> {
    let claimed = claimed_in_use(tx, variant.id).await?;
    Ok((variant.in_use - claimed).max(0))
}

/// Production service for available <-> in use transfers
#[derive(Clone)]
pub struct ProductionService<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> ProductionService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Move tested units of a variant into production
    pub async fn withdraw(
        &self,
        variant_id: Uuid,
        input: ProductionInput,
        operator: Option<String>,
    ) -> AppResult<VariantState> {
        self.transfer(variant_id, input, operator, Operation::WithdrawToProduction)
            .await
    }

    /// Bring unused production units back to available.
    ///
    /// Units claimed by a sale can only come back through a sale reversal.
    pub async fn return_to_stock(
        &self,
        variant_id: Uuid,
        input: ProductionInput,
        operator: Option<String>,
    ) -> AppResult<VariantState> {
        self.transfer(variant_id, input, operator, Operation::ReturnFromProduction)
            .await
    }

    async fn transfer(
        &self,
        variant_id: Uuid,
        input: ProductionInput,
        operator: Option<String>,
        operation: Operation,
    ) -> AppResult<VariantState> {
        let cmd = CommandKey::new(input.idempotency_key, operation, &(variant_id, &input))?;
        let mut tx = self.store.begin().await?;

        let stock = tx.lock_stock_for_variant(variant_id).await?;
        if let Some(state) = cmd.replay(&mut tx).await? {
            return Ok(state);
        }
        let mut stock = stock.ok_or_else(|| LedgerError::not_found("Variant", variant_id))?;
        let mut variant = tx
            .variant(variant_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Variant", variant_id))?;

        let (from, to) = if operation == Operation::WithdrawToProduction {
            (Bucket::Available, Bucket::InUse)
        } else {
            (Bucket::InUse, Bucket::Available)
        };

        let applied = match to {
            Bucket::InUse => variant.withdraw(input.quantity),
            Bucket::Available => {
                let unassigned = unassigned_in_use(&mut tx, &variant).await?;
                if input.quantity > unassigned {
                    Err(LedgerError::InsufficientQuantity {
                        variant_id,
                        requested: input.quantity,
                        available: unassigned,
                    })
                } else {
                    variant.restore(input.quantity)
                }
            }
        };
        if let Err(err) = applied {
            tracing::warn!(
                scan_code = %variant.scan_code,
                %operation,
                requested = input.quantity,
                error = %err,
                "Production transfer rejected"
            );
            return Err(err.into());
        }
        tx.save_variant(&variant).await?;

        let ctx = MovementContext::new(ReferenceType::Production, input.idempotency_key)
            .operator(operator);
        for movement in Movement::transfer(&variant, from, to, input.quantity, &ctx) {
            tx.insert_movement(&movement).await?;
        }
        recompute_stock(&mut tx, &mut stock).await?;

        let state = VariantState {
            stock,
            variant: VariantView::from(variant),
        };
        cmd.remember(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(
            scan_code = %state.variant.variant.scan_code,
            %operation,
            quantity = input.quantity,
            available = state.variant.variant.available,
            in_use = state.variant.variant.in_use,
            "Production transfer recorded"
        );
        Ok(state)
    }
}
