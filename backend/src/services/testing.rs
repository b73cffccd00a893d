//! Inspection of received lots

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    Bucket, Direction, LedgerError, Movement, MovementContext, Operation, Quantity, ReferenceType,
    VariantView,
};
use uuid::Uuid;
use validator::Validate;

use super::stock::{recompute_stock, VariantState};
use super::CommandKey;
use crate::error::AppResult;
use crate::store::{LedgerStore, LedgerTx};

/// Input for releasing inspected units
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompleteTestingInput {
    pub idempotency_key: Uuid,
    pub quantity: Quantity,
    #[validate(length(min = 1, max = 100))]
    pub inspected_by: Option<String>,
    pub tested_on: Option<NaiveDate>,
}

/// Testing service: moves inspected units from pending into available
#[derive(Clone)]
pub struct TestingService<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> TestingService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Release `quantity` inspected units of a variant for use.
    ///
    /// The inspector defaults to the operator; the date defaults to today.
    pub async fn complete_testing(
        &self,
        variant_id: Uuid,
        input: CompleteTestingInput,
        operator: Option<String>,
    ) -> AppResult<VariantState> {
        input.validate()?;
        let cmd = CommandKey::new(
            input.idempotency_key,
            Operation::CompleteTesting,
            &(variant_id, &input),
        )?;
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

        if let Err(err) = variant.complete_testing(input.quantity) {
            tracing::warn!(
                scan_code = %variant.scan_code,
                requested = input.quantity,
                pending = variant.pending_testing,
                "Testing rejected"
            );
            return Err(err.into());
        }
        variant.inspected_by = input.inspected_by.or_else(|| operator.clone());
        variant.tested_on = Some(input.tested_on.unwrap_or_else(|| Utc::now().date_naive()));
        tx.save_variant(&variant).await?;

        let ctx = MovementContext::new(ReferenceType::Testing, input.idempotency_key)
            .reference(variant.inward_id)
            .operator(operator);
        let movement = Movement::record(
            &variant,
            Bucket::Available,
            Direction::In,
            input.quantity,
            &ctx,
        );
        tx.insert_movement(&movement).await?;
        recompute_stock(&mut tx, &mut stock).await?;

        let state = VariantState {
            stock,
            variant: VariantView::from(variant),
        };
        cmd.remember(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(
            scan_code = %state.variant.variant.scan_code,
            quantity = input.quantity,
            pending = state.variant.variant.pending_testing,
            status = ?state.variant.testing_status,
            "Testing completed"
        );
        Ok(state)
    }
}
