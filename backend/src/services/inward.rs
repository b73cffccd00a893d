//! Inward documents and lot receipts

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    normalize_part_no, validate_document_no, validate_part_no, validate_scan_code,
    validate_unit_price, InwardDocument, InwardDocumentView, LedgerError, LotAttributes,
    Operation, Quantity, Stock, Variant, VariantView,
};
use uuid::Uuid;
use validator::Validate;

use super::stock::{recompute_stock, VariantState};
use super::CommandKey;
use crate::error::{AppError, AppResult};
use crate::external::PartCatalog;
use crate::store::{LedgerStore, LedgerTx};

/// Input for opening an inward document
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateInwardInput {
    pub idempotency_key: Uuid,
    pub document_no: String,
    #[validate(length(max = 120))]
    pub supplier: Option<String>,
}

/// Input for receiving one lot into a draft inward document.
///
/// The part is given either directly by `part_no` (and `name` when the part
/// is new) or by a `barcode` resolved through the part catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiveInput {
    pub idempotency_key: Uuid,
    pub scan_code: String,
    pub part_no: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub barcode: Option<String>,
    #[validate(length(max = 64))]
    pub lot_code: Option<String>,
    #[validate(length(max = 64))]
    pub serial_no: Option<String>,
    #[validate(range(max = 1000000000))]
    pub quantity: i64, // = Quantity; validator derive needs the primitive name
    pub unit_price: Decimal,
    pub received_date: Option<NaiveDate>,
}

/// Body of commands that carry nothing but their idempotency key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInput {
    pub idempotency_key: Uuid,
}

/// Part identity resolved before the transaction starts
struct ResolvedPart {
    part_no: String,
    name: Option<String>,
    list_price: Option<Decimal>,
}

/// Inward service for receipts and the draft/finalized document lifecycle
#[derive(Clone)]
pub struct InwardService<S: LedgerStore> {
    store: S,
    catalog: Arc<dyn PartCatalog>,
}

impl<S: LedgerStore> InwardService<S> {
    pub fn new(store: S, catalog: Arc<dyn PartCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Open a draft inward document
    pub async fn create(&self, input: CreateInwardInput) -> AppResult<InwardDocumentView> {
        input.validate()?;
        validate_document_no(&input.document_no)
            .map_err(|msg| AppError::validation("document_no", msg))?;

        let cmd = CommandKey::new(input.idempotency_key, Operation::CreateInward, &input)?;
        let mut tx = self.store.begin().await?;
        if let Some(view) = cmd.replay(&mut tx).await? {
            return Ok(view);
        }

        let document_no = input.document_no.trim();
        if tx.inward_by_document_no(document_no).await?.is_some() {
            return Err(AppError::DuplicateEntry("document_no".to_string()));
        }

        let document = InwardDocument::draft(document_no, input.supplier);
        tx.insert_inward(&document).await?;

        let view = InwardDocumentView {
            document,
            variants: Vec::new(),
        };
        cmd.remember(&mut tx, &view).await?;
        tx.commit().await?;

        tracing::info!(
            inward_id = %view.document.id,
            document_no = %view.document.document_no,
            "Inward document opened"
        );
        Ok(view)
    }

    /// An inward document with its lots
    pub async fn get(&self, inward_id: Uuid) -> AppResult<InwardDocumentView> {
        let mut tx = self.store.begin().await?;
        let document = tx
            .inward(inward_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("InwardDocument", inward_id))?;
        load_view(&mut tx, document).await
    }

    /// Receive a new lot: creates the stock on first receipt of a part and
    /// the variant with its whole quantity awaiting inspection
    pub async fn receive(&self, inward_id: Uuid, input: ReceiveInput) -> AppResult<VariantState> {
        input.validate()?;
        validate_scan_code(&input.scan_code)
            .map_err(|msg| AppError::validation("scan_code", msg))?;
        validate_unit_price(input.unit_price)
            .map_err(|msg| AppError::validation("unit_price", msg))?;
        let part = self.resolve_part(&input).await?;

        let cmd =
            CommandKey::new(input.idempotency_key, Operation::Receive, &(inward_id, &input))?;
        let mut tx = self.store.begin().await?;

        let document = tx.inward(inward_id).await?;
        let existing = tx.lock_stock_by_part_no(&part.part_no).await?;
        if let Some(receipt) = cmd.replay(&mut tx).await? {
            return Ok(receipt);
        }
        let document =
            document.ok_or_else(|| LedgerError::not_found("InwardDocument", inward_id))?;

        if !document.is_draft() {
            return Err(LedgerError::InwardLocked {
                inward_id,
                reason: "document is finalized".to_string(),
            }
            .into());
        }

        if tx.variant_by_scan_code(&input.scan_code).await?.is_some() {
            return Err(LedgerError::DuplicateReceipt {
                scan_code: input.scan_code,
            }
            .into());
        }

        let (mut stock, is_new) = match existing {
            Some(stock) => (stock, false),
            None => {
                let name = part.name.clone().ok_or_else(|| {
                    AppError::validation("name", "Name is required for a new part number")
                })?;
                let list_price = part.list_price.unwrap_or(input.unit_price);
                (Stock::new(&part.part_no, name, list_price), true)
            }
        };

        let received_date = input
            .received_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let variant = Variant::receive(
            stock.id,
            inward_id,
            input.scan_code,
            LotAttributes {
                lot_code: input.lot_code,
                serial_no: input.serial_no,
            },
            input.quantity,
            input.unit_price,
            received_date,
        )?;

        if is_new {
            tx.insert_stock(&stock).await?;
            tracing::info!(part_no = %stock.part_no, stock_id = %stock.id, "Stock created");
        }
        stock.total_received = stock
            .total_received
            .checked_add(variant.received_quantity)
            .ok_or(LedgerError::InvalidQuantity {
                entity: "Stock",
                id: stock.id,
                requested: variant.received_quantity,
                limit: Quantity::MAX - stock.total_received,
            })?;
        tx.insert_variant(&variant).await?;
        recompute_stock(&mut tx, &mut stock).await?;

        let receipt = VariantState {
            stock,
            variant: VariantView::from(variant),
        };
        cmd.remember(&mut tx, &receipt).await?;
        tx.commit().await?;

        tracing::info!(
            scan_code = %receipt.variant.variant.scan_code,
            part_no = %receipt.stock.part_no,
            quantity = receipt.variant.variant.received_quantity,
            unit_price = %receipt.variant.variant.unit_price,
            "Lot received"
        );
        Ok(receipt)
    }

    /// Lock a document once every lot on it has completed testing.
    ///
    /// Finalizing a finalized document returns it unchanged.
    pub async fn finalize(
        &self,
        inward_id: Uuid,
        input: CommandInput,
    ) -> AppResult<InwardDocumentView> {
        let cmd =
            CommandKey::new(input.idempotency_key, Operation::FinalizeInward, &(inward_id, &input))?;
        let mut tx = self.store.begin().await?;

        let document = tx.inward(inward_id).await?;
        if let Some(view) = cmd.replay(&mut tx).await? {
            return Ok(view);
        }
        let mut document =
            document.ok_or_else(|| LedgerError::not_found("InwardDocument", inward_id))?;

        if !document.is_draft() {
            tracing::debug!(%inward_id, "Inward document already finalized");
            return load_view(&mut tx, document).await;
        }

        let view = load_view(&mut tx, document.clone()).await?;
        let open_variants = view.open_variants();
        if open_variants > 0 {
            tracing::warn!(%inward_id, open_variants, "Inward document still under testing");
            return Err(LedgerError::IncompleteTesting {
                inward_id,
                open_variants,
            }
            .into());
        }

        document.finalize();
        tx.save_inward(&document).await?;

        let view = InwardDocumentView {
            document,
            variants: view.variants,
        };
        cmd.remember(&mut tx, &view).await?;
        tx.commit().await?;

        tracing::info!(
            %inward_id,
            document_no = %view.document.document_no,
            "Inward document finalized"
        );
        Ok(view)
    }

    /// Undo a whole draft document whose lots are all untouched: the lots
    /// are removed, their stocks recomputed and the document deleted
    pub async fn delete_draft(
        &self,
        inward_id: Uuid,
        input: CommandInput,
    ) -> AppResult<InwardDocumentView> {
        let cmd =
            CommandKey::new(input.idempotency_key, Operation::DeleteInward, &(inward_id, &input))?;
        let mut tx = self.store.begin().await?;

        let document = tx.inward(inward_id).await?;
        let stock_ids: BTreeSet<Uuid> = match &document {
            Some(_) => tx
                .variants_of_inward(inward_id)
                .await?
                .iter()
                .map(|v| v.stock_id)
                .collect(),
            None => BTreeSet::new(),
        };
        let mut stocks = Vec::with_capacity(stock_ids.len());
        for stock_id in &stock_ids {
            if let Some(stock) = tx.lock_stock(*stock_id).await? {
                stocks.push(stock);
            }
        }

        if let Some(view) = cmd.replay(&mut tx).await? {
            return Ok(view);
        }
        let document =
            document.ok_or_else(|| LedgerError::not_found("InwardDocument", inward_id))?;

        if !document.is_draft() {
            return Err(LedgerError::InwardLocked {
                inward_id,
                reason: "document is finalized".to_string(),
            }
            .into());
        }

        // Re-read under the stock locks
        let variants = tx.variants_of_inward(inward_id).await?;
        if let Some(touched) = variants.iter().find(|v| !v.is_untouched()) {
            tracing::warn!(
                %inward_id,
                scan_code = %touched.scan_code,
                "Inward document has activity"
            );
            return Err(LedgerError::InwardLocked {
                inward_id,
                reason: format!("variant {} already has activity", touched.scan_code),
            }
            .into());
        }

        for v in &variants {
            tx.delete_variant(v.id).await?;
        }
        for stock in &mut stocks {
            let removed: Quantity = variants
                .iter()
                .filter(|v| v.stock_id == stock.id)
                .map(|v| v.received_quantity)
                .sum();
            stock.total_received -= removed;
            recompute_stock(&mut tx, stock).await?;
        }
        tx.delete_inward(inward_id).await?;

        let view = InwardDocumentView {
            document,
            variants: variants.into_iter().map(VariantView::from).collect(),
        };
        cmd.remember(&mut tx, &view).await?;
        tx.commit().await?;

        tracing::info!(%inward_id, variants = view.variants.len(), "Draft inward document deleted");
        Ok(view)
    }

    async fn resolve_part(&self, input: &ReceiveInput) -> AppResult<ResolvedPart> {
        if let Some(part_no) = &input.part_no {
            let part_no = normalize_part_no(part_no);
            validate_part_no(&part_no).map_err(|msg| AppError::validation("part_no", msg))?;
            return Ok(ResolvedPart {
                part_no,
                name: input.name.clone(),
                list_price: None,
            });
        }

        let Some(barcode) = &input.barcode else {
            return Err(AppError::validation(
                "part_no",
                "Either a part number or a barcode is required",
            ));
        };

        let part = self
            .catalog
            .lookup(barcode.trim())
            .await?
            .ok_or_else(|| LedgerError::not_found("Part", barcode))?;
        tracing::debug!(%barcode, part_no = %part.part_no, "Barcode resolved");

        let part_no = normalize_part_no(&part.part_no);
        validate_part_no(&part_no).map_err(|msg| AppError::validation("part_no", msg))?;
        validate_unit_price(part.unit_price)
            .map_err(|msg| AppError::Catalog(format!("part {}: {}", part_no, msg)))?;
        Ok(ResolvedPart {
            part_no,
            name: input.name.clone().or(Some(part.name)),
            list_price: Some(part.unit_price),
        })
    }
}

async fn load_view<X: LedgerTx>(
    tx: &mut X,
    document: InwardDocument,
) -> AppResult<InwardDocumentView> {
    let variants = tx.variants_of_inward(document.id).await?;
    Ok(InwardDocumentView {
        document,
        variants: variants.into_iter().map(VariantView::from).collect(),
    })
}
