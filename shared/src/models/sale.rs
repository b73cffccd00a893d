//! Sales and the invoice / delivery-chalan claims against them

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounting::weighted_average;
use crate::error::LedgerError;
use crate::types::{DocumentKind, Quantity};

/// Quantity of one variant claimed for external dispatch.
///
/// There is at most one sale per variant; later sales of the same variant
/// accumulate into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub stock_id: Uuid,
    /// Total claimed, net of reversals. Invoicing does not lower it.
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub sold_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceAllocation {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub invoice_no: String,
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcAllocation {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub dc_no: String,
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    pub fn open(
        variant_id: Uuid,
        stock_id: Uuid,
        quantity: Quantity,
        unit_price: Decimal,
        sold_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            variant_id,
            stock_id,
            quantity,
            unit_price,
            sold_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold another sale of the same variant into this one
    pub fn accumulate(&mut self, quantity: Quantity, unit_price: Decimal, sold_at: DateTime<Utc>) {
        self.unit_price =
            weighted_average([(self.quantity, self.unit_price), (quantity, unit_price)])
                .unwrap_or(unit_price);
        self.quantity += quantity;
        self.sold_at = sold_at;
        self.updated_at = Utc::now();
    }
}

impl InvoiceAllocation {
    pub fn new(sale_id: Uuid, invoice_no: impl Into<String>, quantity: Quantity) -> Self {
        Self {
            id: Uuid::new_v4(),
            sale_id,
            invoice_no: invoice_no.into(),
            quantity,
            created_at: Utc::now(),
        }
    }
}

impl DcAllocation {
    pub fn new(sale_id: Uuid, dc_no: impl Into<String>, quantity: Quantity) -> Self {
        Self {
            id: Uuid::new_v4(),
            sale_id,
            dc_no: dc_no.into(),
            quantity,
            created_at: Utc::now(),
        }
    }
}

/// A sale with both claim ledgers summed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleStatus {
    #[serde(flatten)]
    pub sale: Sale,
    pub invoiced_quantity: Quantity,
    pub delivered_quantity: Quantity,
    pub remaining_for_invoice: Quantity,
    pub remaining_for_dc: Quantity,
}

impl SaleStatus {
    pub fn new(sale: Sale, invoices: &[InvoiceAllocation], dcs: &[DcAllocation]) -> Self {
        let invoiced_quantity = invoices.iter().map(|a| a.quantity).sum();
        let delivered_quantity = dcs.iter().map(|a| a.quantity).sum();
        Self {
            remaining_for_invoice: sale.quantity - invoiced_quantity,
            remaining_for_dc: sale.quantity - delivered_quantity,
            sale,
            invoiced_quantity,
            delivered_quantity,
        }
    }

    pub fn remaining(&self, document: DocumentKind) -> Quantity {
        match document {
            DocumentKind::Invoice => self.remaining_for_invoice,
            DocumentKind::DeliveryChalan => self.remaining_for_dc,
        }
    }

    /// Check a new claim of `quantity` against one ledger
    pub fn check_claim(&self, document: DocumentKind, quantity: Quantity) -> Result<(), LedgerError> {
        let remaining = self.remaining(document);
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity {
                entity: "Sale",
                id: self.sale.id,
                requested: quantity,
                limit: remaining,
            });
        }
        if quantity > remaining {
            return Err(LedgerError::OverAllocation {
                sale_id: self.sale.id,
                document,
                requested: quantity,
                remaining,
            });
        }
        Ok(())
    }

    /// Check that `quantity` can go back to available stock.
    ///
    /// Only the un-invoiced part of a sale can be reversed.
    pub fn check_reversal(&self, quantity: Quantity) -> Result<(), LedgerError> {
        if quantity <= 0 || quantity > self.sale.quantity {
            return Err(LedgerError::InvalidQuantity {
                entity: "Sale",
                id: self.sale.id,
                requested: quantity,
                limit: self.sale.quantity,
            });
        }
        if quantity > self.remaining_for_invoice {
            return Err(LedgerError::InvoicedQuantity {
                sale_id: self.sale.id,
                requested: quantity,
                invoiced: self.invoiced_quantity,
            });
        }
        Ok(())
    }
}

/// DC quantities to give back, newest allocation first, so that the
/// delivered total fits within `new_quantity`.
///
/// Returns `(allocation id, quantity left on it)` for every allocation
/// that has to change; a zero means the allocation goes away entirely.
pub fn trim_dc_allocations(dcs: &[DcAllocation], new_quantity: Quantity) -> Vec<(Uuid, Quantity)> {
    let delivered: Quantity = dcs.iter().map(|a| a.quantity).sum();
    let mut excess = delivered - new_quantity.max(0);
    let mut changes = Vec::new();

    for dc in dcs.iter().rev() {
        if excess <= 0 {
            break;
        }
        let take = dc.quantity.min(excess);
        changes.push((dc.id, dc.quantity - take));
        excess -= take;
    }

    changes
}
