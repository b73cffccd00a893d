//! In-memory ledger store for tests, demos and single-process embedding
//!
//! Transactions are serialized behind one async mutex. Each transaction
//! works on a copy of the state that replaces the shared state on commit,
//! so a dropped or failed transaction leaves nothing behind. Unique keys are
//! enforced the same way the PostgreSQL schema enforces them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    CommandRecord, DcAllocation, InvoiceAllocation, InwardDocument, LedgerError, Movement, Sale,
    Stock, Variant,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, LedgerTx};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    stocks: Vec<Stock>,
    variants: Vec<Variant>,
    movements: Vec<Movement>,
    sales: Vec<Sale>,
    invoice_allocations: Vec<InvoiceAllocation>,
    dc_allocations: Vec<DcAllocation>,
    inwards: Vec<InwardDocument>,
    commands: HashMap<Uuid, CommandRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx { guard, working })
    }

    async fn ping(&self) -> bool {
        true
    }
}

fn replace<T: Clone>(items: &mut [T], item: &T, matches: impl Fn(&T) -> bool) -> AppResult<()> {
    match items.iter_mut().find(|existing| matches(existing)) {
        Some(slot) => {
            *slot = item.clone();
            Ok(())
        }
        None => Err(AppError::Internal("row to update does not exist".to_string())),
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn find_command(&mut self, key: Uuid) -> AppResult<Option<CommandRecord>> {
        Ok(self.working.commands.get(&key).cloned())
    }

    async fn insert_command(&mut self, record: &CommandRecord) -> AppResult<()> {
        if self.working.commands.contains_key(&record.idempotency_key) {
            return Err(LedgerError::IdempotencyConflict {
                key: record.idempotency_key,
                operation: record.operation,
            }
            .into());
        }
        self.working
            .commands
            .insert(record.idempotency_key, record.clone());
        Ok(())
    }

    async fn lock_stock(&mut self, id: Uuid) -> AppResult<Option<Stock>> {
        Ok(self.working.stocks.iter().find(|s| s.id == id).cloned())
    }

    async fn lock_stock_by_part_no(&mut self, part_no: &str) -> AppResult<Option<Stock>> {
        Ok(self
            .working
            .stocks
            .iter()
            .find(|s| s.part_no == part_no)
            .cloned())
    }

    async fn lock_stock_for_variant(&mut self, variant_id: Uuid) -> AppResult<Option<Stock>> {
        let stock_id = self
            .working
            .variants
            .iter()
            .find(|v| v.id == variant_id)
            .map(|v| v.stock_id);
        match stock_id {
            Some(id) => self.lock_stock(id).await,
            None => Ok(None),
        }
    }

    async fn lock_stock_for_sale(&mut self, sale_id: Uuid) -> AppResult<Option<Stock>> {
        let stock_id = self
            .working
            .sales
            .iter()
            .find(|s| s.id == sale_id)
            .map(|s| s.stock_id);
        match stock_id {
            Some(id) => self.lock_stock(id).await,
            None => Ok(None),
        }
    }

    async fn list_stocks(&mut self) -> AppResult<Vec<Stock>> {
        let mut stocks = self.working.stocks.clone();
        stocks.sort_by(|a, b| a.part_no.cmp(&b.part_no));
        Ok(stocks)
    }

    async fn insert_stock(&mut self, stock: &Stock) -> AppResult<()> {
        if self
            .working
            .stocks
            .iter()
            .any(|s| s.part_no == stock.part_no)
        {
            return Err(AppError::DuplicateEntry("part_no".to_string()));
        }
        self.working.stocks.push(stock.clone());
        Ok(())
    }

    async fn save_stock(&mut self, stock: &Stock) -> AppResult<()> {
        replace(&mut self.working.stocks, stock, |s| s.id == stock.id)
    }

    async fn variant(&mut self, id: Uuid) -> AppResult<Option<Variant>> {
        Ok(self.working.variants.iter().find(|v| v.id == id).cloned())
    }

    async fn variant_by_scan_code(&mut self, scan_code: &str) -> AppResult<Option<Variant>> {
        Ok(self
            .working
            .variants
            .iter()
            .find(|v| v.scan_code == scan_code)
            .cloned())
    }

    async fn variants_of_stock(&mut self, stock_id: Uuid) -> AppResult<Vec<Variant>> {
        let mut variants: Vec<Variant> = self
            .working
            .variants
            .iter()
            .filter(|v| v.stock_id == stock_id)
            .cloned()
            .collect();
        // stable: same-day lots keep receipt order
        variants.sort_by_key(|v| v.received_date);
        Ok(variants)
    }

    async fn variants_of_inward(&mut self, inward_id: Uuid) -> AppResult<Vec<Variant>> {
        Ok(self
            .working
            .variants
            .iter()
            .filter(|v| v.inward_id == inward_id)
            .cloned()
            .collect())
    }

    async fn insert_variant(&mut self, variant: &Variant) -> AppResult<()> {
        if self
            .working
            .variants
            .iter()
            .any(|v| v.scan_code == variant.scan_code)
        {
            return Err(LedgerError::DuplicateReceipt {
                scan_code: variant.scan_code.clone(),
            }
            .into());
        }
        self.working.variants.push(variant.clone());
        Ok(())
    }

    async fn save_variant(&mut self, variant: &Variant) -> AppResult<()> {
        replace(&mut self.working.variants, variant, |v| v.id == variant.id)
    }

    async fn delete_variant(&mut self, id: Uuid) -> AppResult<()> {
        self.working.variants.retain(|v| v.id != id);
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &Movement) -> AppResult<()> {
        let duplicate = self.working.movements.iter().any(|m| {
            m.idempotency_key == movement.idempotency_key
                && m.variant_id == movement.variant_id
                && m.bucket == movement.bucket
                && m.direction == movement.direction
        });
        if duplicate {
            return Err(AppError::DuplicateEntry("movement".to_string()));
        }
        self.working.movements.push(movement.clone());
        Ok(())
    }

    async fn movements_of_variant(&mut self, variant_id: Uuid) -> AppResult<Vec<Movement>> {
        Ok(self
            .working
            .movements
            .iter()
            .filter(|m| m.variant_id == variant_id)
            .cloned()
            .collect())
    }

    async fn sale(&mut self, id: Uuid) -> AppResult<Option<Sale>> {
        Ok(self.working.sales.iter().find(|s| s.id == id).cloned())
    }

    async fn sale_for_variant(&mut self, variant_id: Uuid) -> AppResult<Option<Sale>> {
        Ok(self
            .working
            .sales
            .iter()
            .find(|s| s.variant_id == variant_id)
            .cloned())
    }

    async fn sale_stock_id(&mut self, sale_id: Uuid) -> AppResult<Option<Uuid>> {
        Ok(self
            .working
            .sales
            .iter()
            .find(|s| s.id == sale_id)
            .map(|s| s.stock_id))
    }

    async fn list_sales(&mut self) -> AppResult<Vec<Sale>> {
        let mut sales = self.working.sales.clone();
        sales.sort_by_key(|s| std::cmp::Reverse(s.sold_at));
        Ok(sales)
    }

    async fn insert_sale(&mut self, sale: &Sale) -> AppResult<()> {
        if self
            .working
            .sales
            .iter()
            .any(|s| s.variant_id == sale.variant_id)
        {
            return Err(AppError::DuplicateEntry("variant_id".to_string()));
        }
        self.working.sales.push(sale.clone());
        Ok(())
    }

    async fn save_sale(&mut self, sale: &Sale) -> AppResult<()> {
        replace(&mut self.working.sales, sale, |s| s.id == sale.id)
    }

    async fn delete_sale(&mut self, id: Uuid) -> AppResult<()> {
        self.working.sales.retain(|s| s.id != id);
        Ok(())
    }

    async fn invoice_allocations(&mut self, sale_id: Uuid) -> AppResult<Vec<InvoiceAllocation>> {
        Ok(self
            .working
            .invoice_allocations
            .iter()
            .filter(|a| a.sale_id == sale_id)
            .cloned()
            .collect())
    }

    async fn invoice_allocations_by_invoice(
        &mut self,
        invoice_no: &str,
    ) -> AppResult<Vec<InvoiceAllocation>> {
        Ok(self
            .working
            .invoice_allocations
            .iter()
            .filter(|a| a.invoice_no == invoice_no)
            .cloned()
            .collect())
    }

    async fn insert_invoice_allocation(&mut self, allocation: &InvoiceAllocation) -> AppResult<()> {
        self.working.invoice_allocations.push(allocation.clone());
        Ok(())
    }

    async fn delete_invoice_allocation(&mut self, id: Uuid) -> AppResult<()> {
        self.working.invoice_allocations.retain(|a| a.id != id);
        Ok(())
    }

    async fn dc_allocations(&mut self, sale_id: Uuid) -> AppResult<Vec<DcAllocation>> {
        Ok(self
            .working
            .dc_allocations
            .iter()
            .filter(|a| a.sale_id == sale_id)
            .cloned()
            .collect())
    }

    async fn dc_allocations_by_dc(&mut self, dc_no: &str) -> AppResult<Vec<DcAllocation>> {
        Ok(self
            .working
            .dc_allocations
            .iter()
            .filter(|a| a.dc_no == dc_no)
            .cloned()
            .collect())
    }

    async fn insert_dc_allocation(&mut self, allocation: &DcAllocation) -> AppResult<()> {
        self.working.dc_allocations.push(allocation.clone());
        Ok(())
    }

    async fn save_dc_allocation(&mut self, allocation: &DcAllocation) -> AppResult<()> {
        replace(&mut self.working.dc_allocations, allocation, |a| {
            a.id == allocation.id
        })
    }

    async fn delete_dc_allocation(&mut self, id: Uuid) -> AppResult<()> {
        self.working.dc_allocations.retain(|a| a.id != id);
        Ok(())
    }

    async fn inward(&mut self, id: Uuid) -> AppResult<Option<InwardDocument>> {
        Ok(self.working.inwards.iter().find(|d| d.id == id).cloned())
    }

    async fn inward_by_document_no(
        &mut self,
        document_no: &str,
    ) -> AppResult<Option<InwardDocument>> {
        Ok(self
            .working
            .inwards
            .iter()
            .find(|d| d.document_no == document_no)
            .cloned())
    }

    async fn insert_inward(&mut self, document: &InwardDocument) -> AppResult<()> {
        if self
            .working
            .inwards
            .iter()
            .any(|d| d.document_no == document.document_no)
        {
            return Err(AppError::DuplicateEntry("document_no".to_string()));
        }
        self.working.inwards.push(document.clone());
        Ok(())
    }

    async fn save_inward(&mut self, document: &InwardDocument) -> AppResult<()> {
        replace(&mut self.working.inwards, document, |d| d.id == document.id)
    }

    async fn delete_inward(&mut self, id: Uuid) -> AppResult<()> {
        self.working.inwards.retain(|d| d.id != id);
        Ok(())
    }

    async fn commit(self) -> AppResult<()> {
        let MemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}
