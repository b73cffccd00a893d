//! PostgreSQL ledger store
//!
//! Each ledger transaction is a database transaction at READ COMMITTED.
//! Rows are locked with `SELECT ... FOR UPDATE`, stocks before their
//! variants and sales, so commands on the same stock serialize while other
//! stocks proceed.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{
    Bucket, CommandRecord, DcAllocation, Direction, InvoiceAllocation, InwardDocument,
    InwardStatus, LedgerError, Movement, Operation, ReferenceType, Sale, Stock, Variant,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{LedgerStore, LedgerTx};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PgLedgerStore {
    db: PgPool,
}

impl PgLedgerStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgTx;

    async fn begin(&self) -> AppResult<PgTx> {
        Ok(PgTx {
            tx: self.db.begin().await?,
        })
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.db).await.is_ok()
    }
}

// ============================================================================
// Row mapping
// ============================================================================

const STOCK_COLUMNS: &str = "s.id, s.part_no, s.name, s.unit_price, s.average_cost, \
     s.total_received, s.available, s.in_use, s.pending_testing, s.created_at, s.updated_at";

const VARIANT_COLUMNS: &str = "id, stock_id, inward_id, scan_code, lot_code, serial_no, \
     unit_price, received_date, received_quantity, pending_testing, available, in_use, \
     inspected_by, tested_on, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, variant_id, bucket, direction, quantity, remaining_quantity, \
     reference_type, reference_id, operator, idempotency_key, created_at";

const SALE_COLUMNS: &str =
    "id, variant_id, stock_id, quantity, unit_price, sold_at, created_at, updated_at";

const INWARD_COLUMNS: &str = "id, document_no, supplier, status, created_at, finalized_at";

#[derive(Debug, FromRow)]
struct StockRow {
    id: Uuid,
    part_no: String,
    name: String,
    unit_price: Decimal,
    average_cost: Decimal,
    total_received: i64,
    available: i64,
    in_use: i64,
    pending_testing: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for Stock {
    fn from(r: StockRow) -> Self {
        Stock {
            id: r.id,
            part_no: r.part_no,
            name: r.name,
            unit_price: r.unit_price,
            average_cost: r.average_cost,
            total_received: r.total_received,
            available: r.available,
            in_use: r.in_use,
            pending_testing: r.pending_testing,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct VariantRow {
    id: Uuid,
    stock_id: Uuid,
    inward_id: Uuid,
    scan_code: String,
    lot_code: Option<String>,
    serial_no: Option<String>,
    unit_price: Decimal,
    received_date: NaiveDate,
    received_quantity: i64,
    pending_testing: i64,
    available: i64,
    in_use: i64,
    inspected_by: Option<String>,
    tested_on: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VariantRow> for Variant {
    fn from(r: VariantRow) -> Self {
        Variant {
            id: r.id,
            stock_id: r.stock_id,
            inward_id: r.inward_id,
            scan_code: r.scan_code,
            lot_code: r.lot_code,
            serial_no: r.serial_no,
            unit_price: r.unit_price,
            received_date: r.received_date,
            received_quantity: r.received_quantity,
            pending_testing: r.pending_testing,
            available: r.available,
            in_use: r.in_use,
            inspected_by: r.inspected_by,
            tested_on: r.tested_on,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    variant_id: Uuid,
    bucket: String,
    direction: String,
    quantity: i64,
    remaining_quantity: i64,
    reference_type: String,
    reference_id: Option<Uuid>,
    operator: Option<String>,
    idempotency_key: Uuid,
    created_at: DateTime<Utc>,
}

fn corrupt(column: &str, value: &str) -> AppError {
    AppError::Internal(format!("unexpected {} value '{}' in ledger", column, value))
}

impl TryFrom<MovementRow> for Movement {
    type Error = AppError;

    fn try_from(r: MovementRow) -> AppResult<Self> {
        Ok(Movement {
            id: r.id,
            variant_id: r.variant_id,
            bucket: Bucket::parse(&r.bucket).ok_or_else(|| corrupt("bucket", &r.bucket))?,
            direction: Direction::parse(&r.direction)
                .ok_or_else(|| corrupt("direction", &r.direction))?,
            quantity: r.quantity,
            remaining_quantity: r.remaining_quantity,
            reference_type: ReferenceType::parse(&r.reference_type)
                .ok_or_else(|| corrupt("reference_type", &r.reference_type))?,
            reference_id: r.reference_id,
            operator: r.operator,
            idempotency_key: r.idempotency_key,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: Uuid,
    variant_id: Uuid,
    stock_id: Uuid,
    quantity: i64,
    unit_price: Decimal,
    sold_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SaleRow> for Sale {
    fn from(r: SaleRow) -> Self {
        Sale {
            id: r.id,
            variant_id: r.variant_id,
            stock_id: r.stock_id,
            quantity: r.quantity,
            unit_price: r.unit_price,
            sold_at: r.sold_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct InvoiceAllocationRow {
    id: Uuid,
    sale_id: Uuid,
    invoice_no: String,
    quantity: i64,
    created_at: DateTime<Utc>,
}

impl From<InvoiceAllocationRow> for InvoiceAllocation {
    fn from(r: InvoiceAllocationRow) -> Self {
        InvoiceAllocation {
            id: r.id,
            sale_id: r.sale_id,
            invoice_no: r.invoice_no,
            quantity: r.quantity,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DcAllocationRow {
    id: Uuid,
    sale_id: Uuid,
    dc_no: String,
    quantity: i64,
    created_at: DateTime<Utc>,
}

impl From<DcAllocationRow> for DcAllocation {
    fn from(r: DcAllocationRow) -> Self {
        DcAllocation {
            id: r.id,
            sale_id: r.sale_id,
            dc_no: r.dc_no,
            quantity: r.quantity,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct InwardRow {
    id: Uuid,
    document_no: String,
    supplier: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl TryFrom<InwardRow> for InwardDocument {
    type Error = AppError;

    fn try_from(r: InwardRow) -> AppResult<Self> {
        Ok(InwardDocument {
            id: r.id,
            document_no: r.document_no,
            supplier: r.supplier,
            status: InwardStatus::parse(&r.status).ok_or_else(|| corrupt("status", &r.status))?,
            created_at: r.created_at,
            finalized_at: r.finalized_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CommandRow {
    idempotency_key: Uuid,
    operation: String,
    request_hash: String,
    response: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<CommandRow> for CommandRecord {
    type Error = AppError;

    fn try_from(r: CommandRow) -> AppResult<Self> {
        Ok(CommandRecord {
            idempotency_key: r.idempotency_key,
            operation: Operation::parse(&r.operation)
                .ok_or_else(|| corrupt("operation", &r.operation))?,
            request_hash: r.request_hash,
            response: r.response,
            created_at: r.created_at,
        })
    }
}

/// Turn a unique-key violation into the ledger error for that key.
/// Any other failure stays a database error.
fn unique_violation(err: sqlx::Error, duplicate: impl FnOnce() -> AppError) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            tracing::warn!(
                constraint = db.constraint().unwrap_or("unknown"),
                "Unique key violated by a concurrent command"
            );
            duplicate()
        }
        _ => AppError::DatabaseError(err),
    }
}

// ============================================================================
// Transaction
// ============================================================================

impl PgTx {
    async fn fetch_stock(&mut self, sql: &str, id: Uuid) -> AppResult<Option<Stock>> {
        let row = sqlx::query_as::<_, StockRow>(sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Stock::from))
    }

    async fn fetch_variants(&mut self, filter: &str, id: Uuid) -> AppResult<Vec<Variant>> {
        let rows = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {} FROM variants WHERE {} = $1 ORDER BY received_date, created_at",
            VARIANT_COLUMNS, filter
        ))
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Variant::from).collect())
    }
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn find_command(&mut self, key: Uuid) -> AppResult<Option<CommandRecord>> {
        let row = sqlx::query_as::<_, CommandRow>(
            r#"
            SELECT idempotency_key, operation, request_hash, response, created_at
            FROM command_log
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CommandRecord::try_from).transpose()
    }

    async fn insert_command(&mut self, record: &CommandRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO command_log (idempotency_key, operation, request_hash, response, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.idempotency_key)
        .bind(record.operation.as_str())
        .bind(&record.request_hash)
        .bind(&record.response)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, || {
            LedgerError::IdempotencyConflict {
                key: record.idempotency_key,
                operation: record.operation,
            }
            .into()
        }))?;
        Ok(())
    }

    async fn lock_stock(&mut self, id: Uuid) -> AppResult<Option<Stock>> {
        let sql = format!("SELECT {} FROM stocks s WHERE s.id = $1 FOR UPDATE", STOCK_COLUMNS);
        self.fetch_stock(&sql, id).await
    }

    async fn lock_stock_by_part_no(&mut self, part_no: &str) -> AppResult<Option<Stock>> {
        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {} FROM stocks s WHERE s.part_no = $1 FOR UPDATE",
            STOCK_COLUMNS
        ))
        .bind(part_no)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Stock::from))
    }

    async fn lock_stock_for_variant(&mut self, variant_id: Uuid) -> AppResult<Option<Stock>> {
        let sql = format!(
            "SELECT {} FROM stocks s JOIN variants v ON v.stock_id = s.id \
             WHERE v.id = $1 FOR UPDATE OF s",
            STOCK_COLUMNS
        );
        self.fetch_stock(&sql, variant_id).await
    }

    async fn lock_stock_for_sale(&mut self, sale_id: Uuid) -> AppResult<Option<Stock>> {
        let sql = format!(
            "SELECT {} FROM stocks s JOIN sales sa ON sa.stock_id = s.id \
             WHERE sa.id = $1 FOR UPDATE OF s",
            STOCK_COLUMNS
        );
        self.fetch_stock(&sql, sale_id).await
    }

    async fn list_stocks(&mut self) -> AppResult<Vec<Stock>> {
        let rows = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {} FROM stocks s ORDER BY s.part_no",
            STOCK_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Stock::from).collect())
    }

    async fn insert_stock(&mut self, stock: &Stock) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stocks (id, part_no, name, unit_price, average_cost, total_received,
                                available, in_use, pending_testing, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(stock.id)
        .bind(&stock.part_no)
        .bind(&stock.name)
        .bind(stock.unit_price)
        .bind(stock.average_cost)
        .bind(stock.total_received)
        .bind(stock.available)
        .bind(stock.in_use)
        .bind(stock.pending_testing)
        .bind(stock.created_at)
        .bind(stock.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, || AppError::DuplicateEntry("part_no".to_string())))?;
        Ok(())
    }

    async fn save_stock(&mut self, stock: &Stock) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE stocks
            SET name = $2, unit_price = $3, average_cost = $4, total_received = $5,
                available = $6, in_use = $7, pending_testing = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(stock.id)
        .bind(&stock.name)
        .bind(stock.unit_price)
        .bind(stock.average_cost)
        .bind(stock.total_received)
        .bind(stock.available)
        .bind(stock.in_use)
        .bind(stock.pending_testing)
        .bind(stock.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn variant(&mut self, id: Uuid) -> AppResult<Option<Variant>> {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {} FROM variants WHERE id = $1 FOR UPDATE",
            VARIANT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Variant::from))
    }

    async fn variant_by_scan_code(&mut self, scan_code: &str) -> AppResult<Option<Variant>> {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {} FROM variants WHERE scan_code = $1",
            VARIANT_COLUMNS
        ))
        .bind(scan_code)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Variant::from))
    }

    async fn variants_of_stock(&mut self, stock_id: Uuid) -> AppResult<Vec<Variant>> {
        self.fetch_variants("stock_id", stock_id).await
    }

    async fn variants_of_inward(&mut self, inward_id: Uuid) -> AppResult<Vec<Variant>> {
        self.fetch_variants("inward_id", inward_id).await
    }

    async fn insert_variant(&mut self, v: &Variant) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO variants (id, stock_id, inward_id, scan_code, lot_code, serial_no,
                                  unit_price, received_date, received_quantity, pending_testing,
                                  available, in_use, inspected_by, tested_on, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(v.id)
        .bind(v.stock_id)
        .bind(v.inward_id)
        .bind(&v.scan_code)
        .bind(&v.lot_code)
        .bind(&v.serial_no)
        .bind(v.unit_price)
        .bind(v.received_date)
        .bind(v.received_quantity)
        .bind(v.pending_testing)
        .bind(v.available)
        .bind(v.in_use)
        .bind(&v.inspected_by)
        .bind(v.tested_on)
        .bind(v.created_at)
        .bind(v.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, || {
            LedgerError::DuplicateReceipt {
                scan_code: v.scan_code.clone(),
            }
            .into()
        }))?;
        Ok(())
    }

    async fn save_variant(&mut self, v: &Variant) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE variants
            SET pending_testing = $2, available = $3, in_use = $4,
                inspected_by = $5, tested_on = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(v.id)
        .bind(v.pending_testing)
        .bind(v.available)
        .bind(v.in_use)
        .bind(&v.inspected_by)
        .bind(v.tested_on)
        .bind(v.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_variant(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM variants WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_movement(&mut self, m: &Movement) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO movements (id, variant_id, bucket, direction, quantity, remaining_quantity,
                                   reference_type, reference_id, operator, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(m.id)
        .bind(m.variant_id)
        .bind(m.bucket.as_str())
        .bind(m.direction.as_str())
        .bind(m.quantity)
        .bind(m.remaining_quantity)
        .bind(m.reference_type.as_str())
        .bind(m.reference_id)
        .bind(&m.operator)
        .bind(m.idempotency_key)
        .bind(m.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, || AppError::DuplicateEntry("movement".to_string())))?;
        Ok(())
    }

    async fn movements_of_variant(&mut self, variant_id: Uuid) -> AppResult<Vec<Movement>> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM movements WHERE variant_id = $1 ORDER BY created_at, id",
            MOVEMENT_COLUMNS
        ))
        .bind(variant_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Movement::try_from).collect()
    }

    async fn sale(&mut self, id: Uuid) -> AppResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {} FROM sales WHERE id = $1 FOR UPDATE",
            SALE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Sale::from))
    }

    async fn sale_for_variant(&mut self, variant_id: Uuid) -> AppResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {} FROM sales WHERE variant_id = $1 FOR UPDATE",
            SALE_COLUMNS
        ))
        .bind(variant_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Sale::from))
    }

    async fn sale_stock_id(&mut self, sale_id: Uuid) -> AppResult<Option<Uuid>> {
        let stock_id = sqlx::query_scalar::<_, Uuid>("SELECT stock_id FROM sales WHERE id = $1")
            .bind(sale_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(stock_id)
    }

    async fn list_sales(&mut self) -> AppResult<Vec<Sale>> {
        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {} FROM sales ORDER BY sold_at DESC",
            SALE_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Sale::from).collect())
    }

    async fn insert_sale(&mut self, s: &Sale) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales (id, variant_id, stock_id, quantity, unit_price, sold_at,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(s.id)
        .bind(s.variant_id)
        .bind(s.stock_id)
        .bind(s.quantity)
        .bind(s.unit_price)
        .bind(s.sold_at)
        .bind(s.created_at)
        .bind(s.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, || AppError::DuplicateEntry("variant_id".to_string())))?;
        Ok(())
    }

    async fn save_sale(&mut self, s: &Sale) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE sales
            SET quantity = $2, unit_price = $3, sold_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(s.id)
        .bind(s.quantity)
        .bind(s.unit_price)
        .bind(s.sold_at)
        .bind(s.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_sale(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM sales WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn invoice_allocations(&mut self, sale_id: Uuid) -> AppResult<Vec<InvoiceAllocation>> {
        let rows = sqlx::query_as::<_, InvoiceAllocationRow>(
            r#"
            SELECT id, sale_id, invoice_no, quantity, created_at
            FROM invoice_allocations
            WHERE sale_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(InvoiceAllocation::from).collect())
    }

    async fn invoice_allocations_by_invoice(
        &mut self,
        invoice_no: &str,
    ) -> AppResult<Vec<InvoiceAllocation>> {
        let rows = sqlx::query_as::<_, InvoiceAllocationRow>(
            r#"
            SELECT id, sale_id, invoice_no, quantity, created_at
            FROM invoice_allocations
            WHERE invoice_no = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(invoice_no)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(InvoiceAllocation::from).collect())
    }

    async fn insert_invoice_allocation(&mut self, a: &InvoiceAllocation) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invoice_allocations (id, sale_id, invoice_no, quantity, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(a.id)
        .bind(a.sale_id)
        .bind(&a.invoice_no)
        .bind(a.quantity)
        .bind(a.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_invoice_allocation(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM invoice_allocations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn dc_allocations(&mut self, sale_id: Uuid) -> AppResult<Vec<DcAllocation>> {
        let rows = sqlx::query_as::<_, DcAllocationRow>(
            r#"
            SELECT id, sale_id, dc_no, quantity, created_at
            FROM dc_allocations
            WHERE sale_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(DcAllocation::from).collect())
    }

    async fn dc_allocations_by_dc(&mut self, dc_no: &str) -> AppResult<Vec<DcAllocation>> {
        let rows = sqlx::query_as::<_, DcAllocationRow>(
            r#"
            SELECT id, sale_id, dc_no, quantity, created_at
            FROM dc_allocations
            WHERE dc_no = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(dc_no)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(DcAllocation::from).collect())
    }

    async fn insert_dc_allocation(&mut self, a: &DcAllocation) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dc_allocations (id, sale_id, dc_no, quantity, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(a.id)
        .bind(a.sale_id)
        .bind(&a.dc_no)
        .bind(a.quantity)
        .bind(a.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn save_dc_allocation(&mut self, a: &DcAllocation) -> AppResult<()> {
        sqlx::query("UPDATE dc_allocations SET quantity = $2 WHERE id = $1")
            .bind(a.id)
            .bind(a.quantity)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_dc_allocation(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM dc_allocations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn inward(&mut self, id: Uuid) -> AppResult<Option<InwardDocument>> {
        let row = sqlx::query_as::<_, InwardRow>(&format!(
            "SELECT {} FROM inward_documents WHERE id = $1 FOR UPDATE",
            INWARD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(InwardDocument::try_from).transpose()
    }

    async fn inward_by_document_no(
        &mut self,
        document_no: &str,
    ) -> AppResult<Option<InwardDocument>> {
        let row = sqlx::query_as::<_, InwardRow>(&format!(
            "SELECT {} FROM inward_documents WHERE document_no = $1",
            INWARD_COLUMNS
        ))
        .bind(document_no)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(InwardDocument::try_from).transpose()
    }

    async fn insert_inward(&mut self, d: &InwardDocument) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inward_documents (id, document_no, supplier, status, created_at, finalized_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(d.id)
        .bind(&d.document_no)
        .bind(&d.supplier)
        .bind(d.status.as_str())
        .bind(d.created_at)
        .bind(d.finalized_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, || AppError::DuplicateEntry("document_no".to_string())))?;
        Ok(())
    }

    async fn save_inward(&mut self, d: &InwardDocument) -> AppResult<()> {
        sqlx::query("UPDATE inward_documents SET status = $2, finalized_at = $3 WHERE id = $1")
            .bind(d.id)
            .bind(d.status.as_str())
            .bind(d.finalized_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_inward(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM inward_documents WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
