//! Stock ledger command tests
//!
//! Every command runs against the in-memory store, covering:
//! - Receipt, inspection and weighted-average costing
//! - Production withdrawals and returns
//! - Sales, invoice / DC allocation, reversal and deletion
//! - Inward document lifecycle
//! - Idempotent replay
//! - Ledger conservation after each scenario

use std::str::FromStr;
use std::sync::Arc;

use inventory_ledger::error::AppError;
use inventory_ledger::external::{CsvPartCatalog, NoCatalog, PartCatalog};
use inventory_ledger::services::allocation::AllocationInput;
use inventory_ledger::services::inward::{CommandInput, CreateInwardInput, ReceiveInput};
use inventory_ledger::services::production::ProductionInput;
use inventory_ledger::services::sales::{RecordSaleInput, ReverseSaleInput, SaleOutcome};
use inventory_ledger::services::stock::VariantState;
use inventory_ledger::services::testing::CompleteTestingInput;
use inventory_ledger::services::{
    AllocationService, InwardService, ProductionService, SalesService, StockService,
    TestingService,
};
use inventory_ledger::store::MemoryLedgerStore;
use rust_decimal::Decimal;
use shared::{
    Bucket, DocumentKind, InwardStatus, LedgerError, Movement, Quantity, ReferenceType,
    TestingStatus,
};
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn key() -> Uuid {
    Uuid::new_v4()
}

fn ledger_error(result: Result<impl std::fmt::Debug, AppError>) -> LedgerError {
    match result {
        Err(AppError::Ledger(err)) => err,
        other => panic!("expected a ledger error, got {:?}", other),
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Ledger {
    inward: InwardService<MemoryLedgerStore>,
    testing: TestingService<MemoryLedgerStore>,
    production: ProductionService<MemoryLedgerStore>,
    sales: SalesService<MemoryLedgerStore>,
    allocation: AllocationService<MemoryLedgerStore>,
    stock: StockService<MemoryLedgerStore>,
}

impl Ledger {
    fn new() -> Self {
        Self::with_catalog(Arc::new(NoCatalog))
    }

    fn with_catalog(catalog: Arc<dyn PartCatalog>) -> Self {
        let store = MemoryLedgerStore::new();
        Self {
            inward: InwardService::new(store.clone(), catalog),
            testing: TestingService::new(store.clone()),
            production: ProductionService::new(store.clone()),
            sales: SalesService::new(store.clone()),
            allocation: AllocationService::new(store.clone()),
            stock: StockService::new(store),
        }
    }

    async fn open_inward(&self, document_no: &str) -> Uuid {
        self.inward
            .create(CreateInwardInput {
                idempotency_key: key(),
                document_no: document_no.to_string(),
                supplier: Some("Acme Bearings".to_string()),
            })
            .await
            .unwrap()
            .document
            .id
    }

    async fn receive(
        &self,
        inward_id: Uuid,
        scan_code: &str,
        quantity: Quantity,
        unit_price: &str,
    ) -> Result<VariantState, AppError> {
        self.inward
            .receive(inward_id, receipt(scan_code, quantity, unit_price))
            .await
    }

    async fn test(&self, variant_id: Uuid, quantity: Quantity) -> Result<VariantState, AppError> {
        self.testing
            .complete_testing(
                variant_id,
                CompleteTestingInput {
                    idempotency_key: key(),
                    quantity,
                    inspected_by: None,
                    tested_on: None,
                },
                Some("qc-1".to_string()),
            )
            .await
    }

    async fn withdraw(&self, variant_id: Uuid, quantity: Quantity) -> Result<VariantState, AppError> {
        self.production
            .withdraw(variant_id, production(quantity), None)
            .await
    }

    async fn give_back(&self, variant_id: Uuid, quantity: Quantity) -> Result<VariantState, AppError> {
        self.production
            .return_to_stock(variant_id, production(quantity), None)
            .await
    }

    async fn sell(&self, variant_id: Uuid, quantity: Quantity) -> Result<SaleOutcome, AppError> {
        self.sales
            .record_sale(
                RecordSaleInput {
                    idempotency_key: key(),
                    variant_id,
                    quantity,
                    unit_price: None,
                    sold_at: None,
                },
                None,
            )
            .await
    }

    async fn reverse(&self, sale_id: Uuid, quantity: Quantity) -> Result<SaleOutcome, AppError> {
        self.sales
            .reverse_sale(
                sale_id,
                ReverseSaleInput {
                    idempotency_key: key(),
                    quantity,
                },
                None,
            )
            .await
    }

    async fn invoice(&self, sale_id: Uuid, invoice_no: &str, quantity: Quantity) -> Result<SaleOutcome, AppError> {
        self.allocation
            .allocate_to_invoice(sale_id, allocation(invoice_no, quantity), None)
            .await
    }

    async fn deliver(&self, sale_id: Uuid, dc_no: &str, quantity: Quantity) -> Result<SaleOutcome, AppError> {
        self.allocation
            .allocate_to_dc(sale_id, allocation(dc_no, quantity), None)
            .await
    }

    async fn movements(&self, variant_id: Uuid) -> Vec<Movement> {
        self.stock.movements_for_variant(variant_id).await.unwrap()
    }

    async fn assert_consistent(&self, stock_id: Uuid) {
        let report = self.stock.audit(stock_id).await.unwrap();
        assert!(report.consistent, "ledger audit failed: {:?}", report.issues);
    }

    /// Receive a lot on a fresh inward document and test all of it
    async fn tested_lot(&self, scan_code: &str, quantity: Quantity, unit_price: &str) -> VariantState {
        let inward_id = self.open_inward(&format!("GRN-{}", scan_code)).await;
        let received = self
            .receive(inward_id, scan_code, quantity, unit_price)
            .await
            .unwrap();
        self.test(received.variant.variant.id, quantity).await.unwrap()
    }
}

fn receipt(scan_code: &str, quantity: Quantity, unit_price: &str) -> ReceiveInput {
    ReceiveInput {
        idempotency_key: key(),
        scan_code: scan_code.to_string(),
        part_no: Some("brg-6204".to_string()),
        name: Some("Ball bearing 6204".to_string()),
        barcode: None,
        lot_code: Some("L-2406".to_string()),
        serial_no: None,
        quantity,
        unit_price: dec(unit_price),
        received_date: None,
    }
}

fn production(quantity: Quantity) -> ProductionInput {
    ProductionInput {
        idempotency_key: key(),
        quantity,
    }
}

fn allocation(document_no: &str, quantity: Quantity) -> AllocationInput {
    AllocationInput {
        idempotency_key: key(),
        document_no: document_no.to_string(),
        quantity,
    }
}

fn bucket_sum(movements: &[Movement], bucket: Bucket) -> Quantity {
    movements
        .iter()
        .filter(|m| m.bucket == bucket)
        .map(Movement::signed_quantity)
        .sum()
}

// ============================================================================
// Receipt, inspection and costing
// ============================================================================

#[tokio::test]
async fn test_receipt_testing_and_weighted_cost() {
    let ledger = Ledger::new();
    let inward_id = ledger.open_inward("GRN-001").await;

    // Receive 100 @ 10
    let v1 = ledger.receive(inward_id, "SC-0001", 100, "10").await.unwrap();
    assert_eq!(v1.stock.part_no, "BRG-6204");
    assert_eq!(v1.stock.average_cost, dec("10.00"));
    assert_eq!(v1.stock.pending_testing, 100);
    assert_eq!(v1.stock.total_received, 100);
    assert_eq!(v1.variant.testing_status, TestingStatus::Pending);
    assert!(ledger.movements(v1.variant.variant.id).await.is_empty());

    // Test 40
    let tested = ledger.test(v1.variant.variant.id, 40).await.unwrap();
    assert_eq!(tested.variant.variant.pending_testing, 60);
    assert_eq!(tested.variant.variant.available, 40);
    assert_eq!(tested.variant.variant.inspected_by.as_deref(), Some("qc-1"));
    assert!(tested.variant.variant.tested_on.is_some());
    assert_eq!(tested.variant.testing_status, TestingStatus::PartiallyTested);
    assert_eq!(tested.stock.available, 40);
    assert_eq!(tested.stock.pending_testing, 60);

    // Receive 50 @ 20 into a second lot of the same part
    let v2 = ledger.receive(inward_id, "SC-0002", 50, "20").await.unwrap();
    assert_eq!(v2.stock.id, v1.stock.id);
    assert_eq!(v2.stock.average_cost, dec("13.33"));
    assert_eq!(v2.stock.total_received, 150);
    assert_eq!(v2.stock.pending_testing, 110);

    let summary = ledger.stock.get_stock_summary(" brg-6204 ").await.unwrap();
    assert_eq!(summary.on_hand(), 150);

    let variants = ledger.stock.variants_for_stock(v1.stock.id).await.unwrap();
    assert_eq!(variants.len(), 2);

    ledger.assert_consistent(v1.stock.id).await;
}

#[tokio::test]
async fn test_testing_movement_records_inspector_and_document() {
    let ledger = Ledger::new();
    let inward_id = ledger.open_inward("GRN-002").await;
    let lot = ledger.receive(inward_id, "SC-0100", 20, "7.50").await.unwrap();
    ledger.test(lot.variant.variant.id, 20).await.unwrap();

    let movements = ledger.movements(lot.variant.variant.id).await;
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].bucket, Bucket::Available);
    assert_eq!(movements[0].reference_type, ReferenceType::Testing);
    assert_eq!(movements[0].reference_id, Some(inward_id));
    assert_eq!(movements[0].operator.as_deref(), Some("qc-1"));
    assert_eq!(movements[0].remaining_quantity, 20);
}

#[tokio::test]
async fn test_receipt_rejections() {
    let ledger = Ledger::new();
    let inward_id = ledger.open_inward("GRN-003").await;
    ledger.receive(inward_id, "SC-0200", 5, "1").await.unwrap();

    let err = ledger_error(ledger.receive(inward_id, "SC-0200", 5, "1").await);
    assert!(matches!(err, LedgerError::DuplicateReceipt { scan_code } if scan_code == "SC-0200"));

    let err = ledger_error(ledger.receive(inward_id, "SC-0201", 0, "1").await);
    assert!(matches!(err, LedgerError::InvalidQuantity { requested: 0, .. }));

    assert!(matches!(
        ledger.receive(inward_id, "SC-0202", 5, "-1").await,
        Err(AppError::Validation { .. })
    ));

    let err = ledger_error(ledger.receive(Uuid::new_v4(), "SC-0203", 5, "1").await);
    assert!(matches!(err, LedgerError::NotFound { entity: "InwardDocument", .. }));
}

#[tokio::test]
async fn test_receipt_bounds() {
    let ledger = Ledger::new();
    let inward_id = ledger.open_inward("GRN-005").await;

    assert!(matches!(
        ledger.receive(inward_id, "SC-0250", 1_000_000_001, "1").await,
        Err(AppError::ValidationError(_))
    ));
    assert!(matches!(
        ledger.receive(inward_id, "SC-0251", 5, "10.125").await,
        Err(AppError::Validation { ref field, .. }) if field == "unit_price"
    ));
    assert!(matches!(
        ledger.receive(inward_id, "SC-0252", 5, "1000000000000").await,
        Err(AppError::Validation { ref field, .. }) if field == "unit_price"
    ));

    // Largest lots at the largest price still cost without overflow
    let first = ledger
        .receive(inward_id, "SC-0253", 1_000_000_000, "999999999999.99")
        .await
        .unwrap();
    let second = ledger
        .receive(inward_id, "SC-0254", 1_000_000_000, "999999999999.99")
        .await
        .unwrap();
    assert_eq!(second.stock.id, first.stock.id);
    assert_eq!(second.stock.total_received, 2_000_000_000);
    assert_eq!(second.stock.average_cost, dec("999999999999.99"));
    ledger.assert_consistent(first.stock.id).await;
}

#[tokio::test]
async fn test_testing_limits() {
    let ledger = Ledger::new();
    let inward_id = ledger.open_inward("GRN-004").await;
    let lot = ledger.receive(inward_id, "SC-0300", 10, "3").await.unwrap();
    let id = lot.variant.variant.id;

    let err = ledger_error(ledger.test(id, 11).await);
    assert!(matches!(err, LedgerError::InvalidQuantity { requested: 11, limit: 10, .. }));
    let err = ledger_error(ledger.test(id, 0).await);
    assert!(matches!(err, LedgerError::InvalidQuantity { .. }));

    let done = ledger.test(id, 10).await.unwrap();
    assert_eq!(done.variant.testing_status, TestingStatus::Completed);

    // Nothing left to test
    let err = ledger_error(ledger.test(id, 1).await);
    assert!(matches!(err, LedgerError::InvalidQuantity { limit: 0, .. }));
}

// ============================================================================
// Production
// ============================================================================

#[tokio::test]
async fn test_withdraw_and_return() {
    let ledger = Ledger::new();
    let lot = ledger.tested_lot("SC-0400", 10, "5").await;
    let id = lot.variant.variant.id;

    let err = ledger_error(ledger.withdraw(id, 11).await);
    assert!(matches!(err, LedgerError::InsufficientQuantity { requested: 11, available: 10, .. }));

    let state = ledger.withdraw(id, 6).await.unwrap();
    assert_eq!(state.variant.variant.available, 4);
    assert_eq!(state.variant.variant.in_use, 6);
    assert_eq!(state.stock.in_use, 6);

    let state = ledger.give_back(id, 2).await.unwrap();
    assert_eq!(state.variant.variant.available, 6);
    assert_eq!(state.variant.variant.in_use, 4);

    let movements = ledger.movements(id).await;
    assert_eq!(bucket_sum(&movements, Bucket::Available), 6);
    assert_eq!(bucket_sum(&movements, Bucket::InUse), 4);
    ledger.assert_consistent(lot.stock.id).await;
}

#[tokio::test]
async fn test_return_limited_to_unassigned_units() {
    let ledger = Ledger::new();
    let lot = ledger.tested_lot("SC-0500", 10, "5").await;
    let id = lot.variant.variant.id;

    ledger.withdraw(id, 10).await.unwrap();
    let sale = ledger.sell(id, 6).await.unwrap();
    // The sale was satisfied from production, nothing left available
    assert_eq!(sale.variant.variant.available, 0);
    assert_eq!(sale.variant.variant.in_use, 10);

    let err = ledger_error(ledger.give_back(id, 5).await);
    assert!(matches!(err, LedgerError::InsufficientQuantity { requested: 5, available: 4, .. }));

    let state = ledger.give_back(id, 4).await.unwrap();
    assert_eq!(state.variant.variant.available, 4);
    assert_eq!(state.variant.variant.in_use, 6);
    ledger.assert_consistent(lot.stock.id).await;
}

// ============================================================================
// Sales and allocations
// ============================================================================

#[tokio::test]
async fn test_invoice_and_dc_ledgers_are_independent() {
    let ledger = Ledger::new();
    let inward_id = ledger.open_inward("GRN-010").await;
    let v1 = ledger.receive(inward_id, "SC-1000", 100, "10").await.unwrap();
    let id = v1.variant.variant.id;
    ledger.test(id, 40).await.unwrap();

    let outcome = ledger.sell(id, 40).await.unwrap();
    let sale = outcome.sale.unwrap();
    assert_eq!(sale.sale.quantity, 40);
    assert_eq!(sale.sale.unit_price, dec("10"));
    assert_eq!(outcome.variant.variant.available, 0);
    assert_eq!(outcome.variant.variant.in_use, 40);
    let sale_id = sale.sale.id;

    let invoiced = ledger.invoice(sale_id, "INV-1", 25).await.unwrap();
    let status = invoiced.sale.unwrap();
    assert_eq!(status.remaining_for_invoice, 15);
    assert_eq!(status.sale.quantity, 40);
    assert_eq!(invoiced.variant.variant.in_use, 15);
    assert_eq!(invoiced.stock.in_use, 15);

    let delivered = ledger.deliver(sale_id, "DC-1", 40).await.unwrap();
    let status = delivered.sale.unwrap();
    assert_eq!(status.remaining_for_dc, 0);
    assert_eq!(status.remaining_for_invoice, 15);

    let err = ledger_error(ledger.invoice(sale_id, "INV-2", 20).await);
    assert!(matches!(
        err,
        LedgerError::OverAllocation { document: DocumentKind::Invoice, requested: 20, remaining: 15, .. }
    ));
    let err = ledger_error(ledger.deliver(sale_id, "DC-2", 1).await);
    assert!(matches!(err, LedgerError::OverAllocation { document: DocumentKind::DeliveryChalan, .. }));

    // The rest of the sale can still be invoiced in full
    let done = ledger.invoice(sale_id, "INV-2", 15).await.unwrap();
    let status = done.sale.unwrap();
    assert_eq!(status.remaining_for_invoice, 0);
    assert_eq!(done.variant.variant.in_use, 0);

    let sales = ledger.sales.sales_with_status().await.unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].invoiced_quantity, 40);
    assert_eq!(sales[0].delivered_quantity, 40);

    ledger.assert_consistent(v1.stock.id).await;
}

#[tokio::test]
async fn test_delete_sale_with_invoices_is_rejected() {
    let ledger = Ledger::new();
    let lot = ledger.tested_lot("SC-1100", 40, "10").await;
    let sale_id = ledger
        .sell(lot.variant.variant.id, 40)
        .await
        .unwrap()
        .sale
        .unwrap()
        .sale
        .id;
    ledger.invoice(sale_id, "INV-9", 25).await.unwrap();

    let err = ledger_error(
        ledger
            .sales
            .delete_sale_permanently(sale_id, CommandInput { idempotency_key: key() })
            .await,
    );
    assert!(matches!(err, LedgerError::InvoicedQuantity { invoiced: 25, .. }));
}

#[tokio::test]
async fn test_delete_sale_leaves_units_in_production() {
    let ledger = Ledger::new();
    let lot = ledger.tested_lot("SC-1200", 10, "10").await;
    let id = lot.variant.variant.id;
    let sale_id = ledger.sell(id, 8).await.unwrap().sale.unwrap().sale.id;
    ledger.deliver(sale_id, "DC-7", 8).await.unwrap();
    let before = ledger.movements(id).await.len();

    let deleted = ledger
        .sales
        .delete_sale_permanently(sale_id, CommandInput { idempotency_key: key() })
        .await
        .unwrap();
    assert_eq!(deleted.sale.quantity, 8);
    assert_eq!(deleted.delivered_quantity, 8);

    assert!(ledger.sales.sales_with_status().await.unwrap().is_empty());
    assert_eq!(ledger.movements(id).await.len(), before);

    // The eight units are now plain production stock and can go back
    let state = ledger.give_back(id, 8).await.unwrap();
    assert_eq!(state.variant.variant.available, 10);
    assert_eq!(state.variant.variant.in_use, 0);
    ledger.assert_consistent(lot.stock.id).await;
}

#[tokio::test]
async fn test_round_trip_leaves_no_trace_in_use() {
    let ledger = Ledger::new();
    let lot = ledger.tested_lot("SC-1300", 10, "5").await;
    let id = lot.variant.variant.id;

    ledger.withdraw(id, 10).await.unwrap();
    let sale_id = ledger.sell(id, 10).await.unwrap().sale.unwrap().sale.id;
    let reversed = ledger.reverse(sale_id, 10).await.unwrap();

    assert!(reversed.sale.is_none());
    assert_eq!(reversed.variant.variant.available, 10);
    assert_eq!(reversed.variant.variant.in_use, 0);
    assert_eq!(reversed.variant.variant.pending_testing, 0);

    let movements = ledger.movements(id).await;
    assert_eq!(bucket_sum(&movements, Bucket::InUse), 0);
    assert_eq!(bucket_sum(&movements, Bucket::Available), 10);
    assert!(ledger.sales.sales_with_status().await.unwrap().is_empty());
    ledger.assert_consistent(lot.stock.id).await;
}

#[tokio::test]
async fn test_sale_draws_on_production_before_available() {
    let ledger = Ledger::new();
    let lot = ledger.tested_lot("SC-1400", 10, "5").await;
    let id = lot.variant.variant.id;

    ledger.withdraw(id, 3).await.unwrap();
    let outcome = ledger.sell(id, 5).await.unwrap();
    assert_eq!(outcome.variant.variant.available, 5);
    assert_eq!(outcome.variant.variant.in_use, 5);

    let err = ledger_error(ledger.sell(id, 6).await);
    assert!(matches!(err, LedgerError::InsufficientQuantity { requested: 6, available: 5, .. }));

    // A second sale of the same variant accumulates into the first
    let outcome = ledger.sell(id, 5).await.unwrap();
    assert_eq!(outcome.sale.unwrap().sale.quantity, 10);
    assert_eq!(ledger.sales.sales_with_status().await.unwrap().len(), 1);
    ledger.assert_consistent(lot.stock.id).await;
}

#[tokio::test]
async fn test_reverse_sale_limits_and_dc_trimming() {
    let ledger = Ledger::new();
    let lot = ledger.tested_lot("SC-1500", 10, "5").await;
    let id = lot.variant.variant.id;
    let sale_id = ledger.sell(id, 10).await.unwrap().sale.unwrap().sale.id;

    ledger.deliver(sale_id, "DC-1", 6).await.unwrap();
    ledger.deliver(sale_id, "DC-2", 4).await.unwrap();
    ledger.invoice(sale_id, "INV-1", 2).await.unwrap();

    let err = ledger_error(ledger.reverse(sale_id, 0).await);
    assert!(matches!(err, LedgerError::InvalidQuantity { .. }));
    let err = ledger_error(ledger.reverse(sale_id, 11).await);
    assert!(matches!(err, LedgerError::InvalidQuantity { limit: 10, .. }));
    let err = ledger_error(ledger.reverse(sale_id, 9).await);
    assert!(matches!(err, LedgerError::InvoicedQuantity { requested: 9, invoiced: 2, .. }));

    let reversed = ledger.reverse(sale_id, 3).await.unwrap();
    let status = reversed.sale.unwrap();
    assert_eq!(status.sale.quantity, 7);
    assert_eq!(status.delivered_quantity, 7);
    assert_eq!(status.invoiced_quantity, 2);
    assert_eq!(status.remaining_for_invoice, 5);
    assert_eq!(reversed.variant.variant.available, 3);
    assert_eq!(reversed.variant.variant.in_use, 5);

    // Trimming DC-2 down to one unit took the newest allocation first
    ledger
        .allocation
        .cancel_dc("DC-1", CommandInput { idempotency_key: key() })
        .await
        .unwrap();
    let sales = ledger.sales.sales_with_status().await.unwrap();
    assert_eq!(sales[0].delivered_quantity, 1);
    ledger.assert_consistent(lot.stock.id).await;
}

#[tokio::test]
async fn test_cancel_invoice_reinstates_units() {
    let ledger = Ledger::new();
    let lot = ledger.tested_lot("SC-1600", 10, "5").await;
    let id = lot.variant.variant.id;
    let sale_id = ledger.sell(id, 10).await.unwrap().sale.unwrap().sale.id;
    ledger.invoice(sale_id, "INV-5", 4).await.unwrap();
    ledger.invoice(sale_id, "INV-5", 2).await.unwrap();

    let cancel_key = key();
    let cancelled = ledger
        .allocation
        .cancel_invoice("INV-5", CommandInput { idempotency_key: cancel_key }, None)
        .await
        .unwrap();
    assert_eq!(cancelled.allocations_removed, 2);
    assert_eq!(cancelled.quantity, 6);
    assert_eq!(cancelled.sales[0].remaining_for_invoice, 10);

    let sales = ledger.sales.sales_with_status().await.unwrap();
    assert_eq!(sales[0].invoiced_quantity, 0);

    // Retrying the same cancellation replays it
    let replayed = ledger
        .allocation
        .cancel_invoice("INV-5", CommandInput { idempotency_key: cancel_key }, None)
        .await
        .unwrap();
    assert_eq!(replayed.quantity, 6);

    let err = ledger_error(
        ledger
            .allocation
            .cancel_invoice("INV-5", CommandInput { idempotency_key: key() }, None)
            .await,
    );
    assert!(matches!(err, LedgerError::NotFound { entity: "Invoice", .. }));

    let movements = ledger.movements(id).await;
    assert_eq!(bucket_sum(&movements, Bucket::InUse), 10);
    ledger.assert_consistent(lot.stock.id).await;
}

// ============================================================================
// Inward document lifecycle
// ============================================================================

#[tokio::test]
async fn test_finalize_requires_completed_testing() {
    let ledger = Ledger::new();
    let inward_id = ledger.open_inward("GRN-020").await;
    let a = ledger.receive(inward_id, "SC-2000", 5, "2").await.unwrap();
    let b = ledger.receive(inward_id, "SC-2001", 5, "2").await.unwrap();
    ledger.test(a.variant.variant.id, 5).await.unwrap();
    ledger.test(b.variant.variant.id, 2).await.unwrap();

    let err = ledger_error(
        ledger
            .inward
            .finalize(inward_id, CommandInput { idempotency_key: key() })
            .await,
    );
    assert!(matches!(err, LedgerError::IncompleteTesting { open_variants: 1, .. }));

    ledger.test(b.variant.variant.id, 3).await.unwrap();
    let view = ledger
        .inward
        .finalize(inward_id, CommandInput { idempotency_key: key() })
        .await
        .unwrap();
    assert_eq!(view.document.status, InwardStatus::Finalized);
    assert!(view.document.finalized_at.is_some());
    assert_eq!(view.variants.len(), 2);

    // Finalizing again just returns the document
    let again = ledger
        .inward
        .finalize(inward_id, CommandInput { idempotency_key: key() })
        .await
        .unwrap();
    assert_eq!(again.document.finalized_at, view.document.finalized_at);

    let err = ledger_error(ledger.receive(inward_id, "SC-2002", 5, "2").await);
    assert!(matches!(err, LedgerError::InwardLocked { .. }));
}

#[tokio::test]
async fn test_delete_draft_inward_reverses_receipts() {
    let ledger = Ledger::new();
    let keep = ledger.open_inward("GRN-030").await;
    let kept = ledger.receive(keep, "SC-3000", 10, "10").await.unwrap();

    let inward_id = ledger.open_inward("GRN-031").await;
    ledger.receive(inward_id, "SC-3001", 30, "20").await.unwrap();

    let deleted = ledger
        .inward
        .delete_draft(inward_id, CommandInput { idempotency_key: key() })
        .await
        .unwrap();
    assert_eq!(deleted.variants.len(), 1);

    let stock = ledger.stock.get_stock_summary("BRG-6204").await.unwrap();
    assert_eq!(stock.total_received, 10);
    assert_eq!(stock.pending_testing, 10);
    assert_eq!(stock.average_cost, dec("10.00"));

    let err = ledger_error(ledger.inward.get(inward_id).await);
    assert!(matches!(err, LedgerError::NotFound { .. }));

    // The scan code is free again
    let again = ledger.open_inward("GRN-032").await;
    ledger.receive(again, "SC-3001", 30, "20").await.unwrap();

    // A document with inspected lots cannot be deleted
    ledger.test(kept.variant.variant.id, 1).await.unwrap();
    let err = ledger_error(
        ledger
            .inward
            .delete_draft(keep, CommandInput { idempotency_key: key() })
            .await,
    );
    assert!(matches!(err, LedgerError::InwardLocked { .. }));
    ledger.assert_consistent(kept.stock.id).await;
}

#[tokio::test]
async fn test_duplicate_document_number() {
    let ledger = Ledger::new();
    ledger.open_inward("GRN-040").await;
    let result = ledger
        .inward
        .create(CreateInwardInput {
            idempotency_key: key(),
            document_no: "GRN-040".to_string(),
            supplier: None,
        })
        .await;
    assert!(matches!(result, Err(AppError::DuplicateEntry(_))));
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn test_replayed_testing_applies_once() {
    let ledger = Ledger::new();
    let inward_id = ledger.open_inward("GRN-050").await;
    let lot = ledger.receive(inward_id, "SC-5000", 10, "1").await.unwrap();
    let id = lot.variant.variant.id;

    let input = CompleteTestingInput {
        idempotency_key: key(),
        quantity: 4,
        inspected_by: Some("lab".to_string()),
        tested_on: None,
    };
    let first = ledger
        .testing
        .complete_testing(id, input.clone(), None)
        .await
        .unwrap();
    let second = ledger
        .testing
        .complete_testing(id, input.clone(), None)
        .await
        .unwrap();

    assert_eq!(first.variant.variant.pending_testing, 6);
    assert_eq!(second.variant.variant.pending_testing, 6);
    assert_eq!(first.variant.variant.updated_at, second.variant.variant.updated_at);
    assert_eq!(ledger.movements(id).await.len(), 1);

    // Same key, different request
    let err = ledger_error(
        ledger
            .testing
            .complete_testing(id, CompleteTestingInput { quantity: 5, ..input.clone() }, None)
            .await,
    );
    assert!(matches!(err, LedgerError::IdempotencyConflict { .. }));

    // Same key, different command
    let err = ledger_error(
        ledger
            .production
            .withdraw(
                id,
                ProductionInput {
                    idempotency_key: input.idempotency_key,
                    quantity: 1,
                },
                None,
            )
            .await,
    );
    assert!(matches!(err, LedgerError::IdempotencyConflict { .. }));
}

#[tokio::test]
async fn test_replayed_reversal_after_sale_is_gone() {
    let ledger = Ledger::new();
    let lot = ledger.tested_lot("SC-5100", 4, "1").await;
    let sale_id = ledger
        .sell(lot.variant.variant.id, 4)
        .await
        .unwrap()
        .sale
        .unwrap()
        .sale
        .id;

    let input = ReverseSaleInput {
        idempotency_key: key(),
        quantity: 4,
    };
    let first = ledger
        .sales
        .reverse_sale(sale_id, input.clone(), None)
        .await
        .unwrap();
    let second = ledger
        .sales
        .reverse_sale(sale_id, input, None)
        .await
        .unwrap();

    assert!(first.sale.is_none());
    assert_eq!(second.variant.variant.available, 4);
    assert_eq!(
        ledger.stock.get_stock_summary("BRG-6204").await.unwrap().available,
        4
    );
}

// ============================================================================
// Part catalog
// ============================================================================

#[tokio::test]
async fn test_receive_by_barcode_through_csv_catalog() {
    let path = std::env::temp_dir().join(format!("parts-{}.csv", Uuid::new_v4()));
    std::fs::write(
        &path,
        "barcode,part_no,name,unit_price\n8901234567890,flt-0042,Oil filter,12.40\n",
    )
    .unwrap();

    let ledger = Ledger::with_catalog(Arc::new(CsvPartCatalog::new(&path)));
    let inward_id = ledger.open_inward("GRN-060").await;

    let mut input = receipt("SC-6000", 3, "11.90");
    input.part_no = None;
    input.name = None;
    input.barcode = Some("8901234567890".to_string());
    let lot = ledger.inward.receive(inward_id, input).await.unwrap();

    assert_eq!(lot.stock.part_no, "FLT-0042");
    assert_eq!(lot.stock.name, "Oil filter");
    assert_eq!(lot.stock.unit_price, dec("12.40"));
    assert_eq!(lot.stock.average_cost, dec("11.90"));

    let mut unknown = receipt("SC-6001", 3, "11.90");
    unknown.part_no = None;
    unknown.barcode = Some("0000000000000".to_string());
    let err = ledger_error(ledger.inward.receive(inward_id, unknown).await);
    assert!(matches!(err, LedgerError::NotFound { entity: "Part", .. }));

    std::fs::remove_file(&path).ok();
}

// ============================================================================
// Concurrent commands
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_testing_of_whole_lot_applies_once() {
    let ledger = Ledger::new();
    let inward_id = ledger.open_inward("GRN-700").await;
    let lot = ledger.receive(inward_id, "SC-7000", 10, "4").await.unwrap();
    let id = lot.variant.variant.id;

    let (a, b) = tokio::join!(ledger.test(id, 10), ledger.test(id, 10));
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let err = ledger_error(if a.is_ok() { b } else { a });
    assert!(matches!(err, LedgerError::InvalidQuantity { limit: 0, .. }));

    let summary = ledger.stock.get_stock_summary("BRG-6204").await.unwrap();
    assert_eq!(summary.available, 10);
    assert_eq!(summary.pending_testing, 0);
    assert_eq!(ledger.movements(id).await.len(), 1);
    ledger.assert_consistent(lot.stock.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() {
    let ledger = Arc::new(Ledger::new());
    let lot = ledger.tested_lot("SC-7100", 10, "4").await;
    let id = lot.variant.variant.id;

    let first = tokio::spawn({
        let ledger = ledger.clone();
        async move { ledger.withdraw(id, 10).await }
    });
    let second = tokio::spawn({
        let ledger = ledger.clone();
        async move { ledger.withdraw(id, 10).await }
    });
    let (first, second) = (first.await.unwrap(), second.await.unwrap());

    assert!(first.is_ok() != second.is_ok());
    let err = ledger_error(if first.is_ok() { second } else { first });
    assert!(matches!(err, LedgerError::InsufficientQuantity { requested: 10, available: 0, .. }));
    ledger.assert_consistent(lot.stock.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reversal_and_invoice_of_whole_sale() {
    let ledger = Ledger::new();
    let lot = ledger.tested_lot("SC-7200", 10, "4").await;
    let id = lot.variant.variant.id;
    let sale_id = ledger.sell(id, 10).await.unwrap().sale.unwrap().sale.id;

    let (reversed, invoiced) = tokio::join!(
        ledger.reverse(sale_id, 10),
        ledger.invoice(sale_id, "INV-70", 10)
    );
    assert!(reversed.is_ok() != invoiced.is_ok());

    let sales = ledger.sales.sales_with_status().await.unwrap();
    if reversed.is_ok() {
        assert!(sales.is_empty());
        let summary = ledger.stock.get_stock_summary("BRG-6204").await.unwrap();
        assert_eq!(summary.available, 10);
    } else {
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].invoiced_quantity, 10);
    }
    ledger.assert_consistent(lot.stock.id).await;
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Step {
        Test(Quantity),
        Withdraw(Quantity),
        Return(Quantity),
        Sell(Quantity),
        Invoice(Quantity),
        Deliver(Quantity),
        Reverse(Quantity),
        CancelInvoice,
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        let qty = 1i64..=20i64;
        prop_oneof![
            qty.clone().prop_map(Step::Test),
            qty.clone().prop_map(Step::Withdraw),
            qty.clone().prop_map(Step::Return),
            qty.clone().prop_map(Step::Sell),
            qty.clone().prop_map(Step::Invoice),
            qty.clone().prop_map(Step::Deliver),
            qty.prop_map(Step::Reverse),
            Just(Step::CancelInvoice),
        ]
    }

    /// Apply a step, tolerating rule violations but nothing else
    async fn apply(ledger: &Ledger, variant_id: Uuid, invoices: &mut Vec<String>, index: usize, step: &Step) {
        let sale_id = ledger
            .sales
            .sales_with_status()
            .await
            .unwrap()
            .first()
            .map(|s| s.sale.id);

        let result: Result<(), AppError> = match (step, sale_id) {
            (Step::Test(q), _) => ledger.test(variant_id, *q).await.map(|_| ()),
            (Step::Withdraw(q), _) => ledger.withdraw(variant_id, *q).await.map(|_| ()),
            (Step::Return(q), _) => ledger.give_back(variant_id, *q).await.map(|_| ()),
            (Step::Sell(q), _) => ledger.sell(variant_id, *q).await.map(|_| ()),
            (Step::Invoice(q), Some(sale_id)) => {
                let invoice_no = format!("INV-{}", index);
                let result = ledger.invoice(sale_id, &invoice_no, *q).await.map(|_| ());
                if result.is_ok() {
                    invoices.push(invoice_no);
                }
                result
            }
            (Step::Deliver(q), Some(sale_id)) => ledger
                .deliver(sale_id, &format!("DC-{}", index), *q)
                .await
                .map(|_| ()),
            (Step::Reverse(q), Some(sale_id)) => ledger.reverse(sale_id, *q).await.map(|_| ()),
            (Step::CancelInvoice, _) => match invoices.pop() {
                Some(invoice_no) => ledger
                    .allocation
                    .cancel_invoice(&invoice_no, CommandInput { idempotency_key: key() }, None)
                    .await
                    .map(|_| ()),
                None => Ok(()),
            },
            (_, None) => Ok(()),
        };

        if let Err(err) = result {
            assert!(matches!(err, AppError::Ledger(_)), "unexpected error: {:?}", err);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Quantities and the movement ledger agree after any command sequence,
        /// and every received unit is either on hand or invoiced
        #[test]
        fn prop_ledger_stays_consistent(steps in prop::collection::vec(step_strategy(), 1..25)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let ledger = Ledger::new();
                let inward_id = ledger.open_inward("GRN-PROP").await;
                let lot = ledger.receive(inward_id, "SC-PROP", 50, "2.50").await.unwrap();
                let variant_id = lot.variant.variant.id;
                let mut invoices = Vec::new();

                for (index, step) in steps.iter().enumerate() {
                    apply(&ledger, variant_id, &mut invoices, index, step).await;
                }

                ledger.assert_consistent(lot.stock.id).await;

                let variant = ledger
                    .stock
                    .variants_for_stock(lot.stock.id)
                    .await
                    .unwrap()
                    .remove(0)
                    .variant;
                let invoiced: Quantity = ledger
                    .sales
                    .sales_with_status()
                    .await
                    .unwrap()
                    .iter()
                    .map(|s| s.invoiced_quantity)
                    .sum();
                assert_eq!(variant.total_quantity() + invoiced, 50);
                assert!(variant.pending_testing >= 0 && variant.available >= 0 && variant.in_use >= 0);
            });
        }
    }
}
