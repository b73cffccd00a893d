//! Ledger Store: transactional persistence for the stock ledger
//!
//! Every command runs inside one [`LedgerTx`]. Nothing a transaction writes
//! is visible to anyone else until [`LedgerTx::commit`]; dropping the
//! transaction discards it.
//!
//! Lock order inside a transaction is inward document, then stock, then
//! variant, then sale; several stocks are locked in ascending id order. The
//! `lock_stock*` methods take the stock lock; the plain getters for
//! variants, sales and inward documents lock their row as well on stores
//! that support row locks.

use async_trait::async_trait;
use shared::{
    CommandRecord, DcAllocation, InvoiceAllocation, InwardDocument, Movement, Sale, Stock,
    Variant,
};
use uuid::Uuid;

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// A handle that can open ledger transactions
#[async_trait]
pub trait LedgerStore: Clone + Send + Sync + 'static {
    type Tx: LedgerTx;

    async fn begin(&self) -> AppResult<Self::Tx>;

    /// Whether the backing storage is reachable
    async fn ping(&self) -> bool;
}

/// One atomic unit of work against the ledger
#[async_trait]
pub trait LedgerTx: Send + Sized {
    // Idempotency
    async fn find_command(&mut self, key: Uuid) -> AppResult<Option<CommandRecord>>;
    async fn insert_command(&mut self, record: &CommandRecord) -> AppResult<()>;

    // Stocks
    async fn lock_stock(&mut self, id: Uuid) -> AppResult<Option<Stock>>;
    async fn lock_stock_by_part_no(&mut self, part_no: &str) -> AppResult<Option<Stock>>;
    async fn lock_stock_for_variant(&mut self, variant_id: Uuid) -> AppResult<Option<Stock>>;
    async fn lock_stock_for_sale(&mut self, sale_id: Uuid) -> AppResult<Option<Stock>>;
    async fn list_stocks(&mut self) -> AppResult<Vec<Stock>>;
    async fn insert_stock(&mut self, stock: &Stock) -> AppResult<()>;
    async fn save_stock(&mut self, stock: &Stock) -> AppResult<()>;

    // Variants
    async fn variant(&mut self, id: Uuid) -> AppResult<Option<Variant>>;
    async fn variant_by_scan_code(&mut self, scan_code: &str) -> AppResult<Option<Variant>>;
    /// Ordered by received date, oldest first
    async fn variants_of_stock(&mut self, stock_id: Uuid) -> AppResult<Vec<Variant>>;
    async fn variants_of_inward(&mut self, inward_id: Uuid) -> AppResult<Vec<Variant>>;
    async fn insert_variant(&mut self, variant: &Variant) -> AppResult<()>;
    async fn save_variant(&mut self, variant: &Variant) -> AppResult<()>;
    async fn delete_variant(&mut self, id: Uuid) -> AppResult<()>;

    // Movements
    async fn insert_movement(&mut self, movement: &Movement) -> AppResult<()>;
    /// Oldest first
    async fn movements_of_variant(&mut self, variant_id: Uuid) -> AppResult<Vec<Movement>>;

    // Sales
    async fn sale(&mut self, id: Uuid) -> AppResult<Option<Sale>>;
    async fn sale_for_variant(&mut self, variant_id: Uuid) -> AppResult<Option<Sale>>;
    /// Stock of a sale, read without locking anything
    async fn sale_stock_id(&mut self, sale_id: Uuid) -> AppResult<Option<Uuid>>;
    async fn list_sales(&mut self) -> AppResult<Vec<Sale>>;
    async fn insert_sale(&mut self, sale: &Sale) -> AppResult<()>;
    async fn save_sale(&mut self, sale: &Sale) -> AppResult<()>;
    async fn delete_sale(&mut self, id: Uuid) -> AppResult<()>;

    // Invoice allocations, oldest first
    async fn invoice_allocations(&mut self, sale_id: Uuid) -> AppResult<Vec<InvoiceAllocation>>;
    async fn invoice_allocations_by_invoice(
        &mut self,
        invoice_no: &str,
    ) -> AppResult<Vec<InvoiceAllocation>>;
    async fn insert_invoice_allocation(&mut self, allocation: &InvoiceAllocation) -> AppResult<()>;
    async fn delete_invoice_allocation(&mut self, id: Uuid) -> AppResult<()>;

    // DC allocations, oldest first
    async fn dc_allocations(&mut self, sale_id: Uuid) -> AppResult<Vec<DcAllocation>>;
    async fn dc_allocations_by_dc(&mut self, dc_no: &str) -> AppResult<Vec<DcAllocation>>;
    async fn insert_dc_allocation(&mut self, allocation: &DcAllocation) -> AppResult<()>;
    async fn save_dc_allocation(&mut self, allocation: &DcAllocation) -> AppResult<()>;
    async fn delete_dc_allocation(&mut self, id: Uuid) -> AppResult<()>;

    // Inward documents
    async fn inward(&mut self, id: Uuid) -> AppResult<Option<InwardDocument>>;
    async fn inward_by_document_no(&mut self, document_no: &str)
        -> AppResult<Option<InwardDocument>>;
    async fn insert_inward(&mut self, document: &InwardDocument) -> AppResult<()>;
    async fn save_inward(&mut self, document: &InwardDocument) -> AppResult<()>;
    async fn delete_inward(&mut self, id: Uuid) -> AppResult<()>;

    async fn commit(self) -> AppResult<()>;
}
