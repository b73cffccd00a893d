//! Receipt lots and their quantity buckets

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::types::Quantity;

/// One receipt lot of a stock, identified permanently by its scan code.
///
/// Quantity only ever moves through the transition methods below, each of
/// which checks its precondition before touching any bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub stock_id: Uuid,
    pub inward_id: Uuid,
    pub scan_code: String,
    pub lot_code: Option<String>,
    pub serial_no: Option<String>,
    /// Unit price at receipt
    pub unit_price: Decimal,
    pub received_date: NaiveDate,
    /// Original lot size
    pub received_quantity: Quantity,
    pub pending_testing: Quantity,
    pub available: Quantity,
    pub in_use: Quantity,
    pub inspected_by: Option<String>,
    pub tested_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Batch and serial attributes captured on receipt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAttributes {
    pub lot_code: Option<String>,
    pub serial_no: Option<String>,
}

/// Inspection progress, derived from the quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestingStatus {
    Pending,
    PartiallyTested,
    Completed,
}

impl Variant {
    /// Create a lot with its whole quantity awaiting inspection
    pub fn receive(
        stock_id: Uuid,
        inward_id: Uuid,
        scan_code: impl Into<String>,
        lot: LotAttributes,
        quantity: Quantity,
        unit_price: Decimal,
        received_date: NaiveDate,
    ) -> Result<Self, LedgerError> {
        let id = Uuid::new_v4();
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity {
                entity: "Variant",
                id,
                requested: quantity,
                limit: Quantity::MAX,
            });
        }

        let now = Utc::now();
        Ok(Self {
            id,
            stock_id,
            inward_id,
            scan_code: scan_code.into(),
            lot_code: lot.lot_code,
            serial_no: lot.serial_no,
            unit_price,
            received_date,
            received_quantity: quantity,
            pending_testing: quantity,
            available: 0,
            in_use: 0,
            inspected_by: None,
            tested_on: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn testing_status(&self) -> TestingStatus {
        if self.pending_testing == 0 {
            TestingStatus::Completed
        } else if self.pending_testing < self.received_quantity {
            TestingStatus::PartiallyTested
        } else {
            TestingStatus::Pending
        }
    }

    /// True while nothing has happened to the lot since it was received
    pub fn is_untouched(&self) -> bool {
        self.pending_testing == self.received_quantity && self.available == 0 && self.in_use == 0
    }

    /// Cost-bearing units across all buckets
    pub fn total_quantity(&self) -> Quantity {
        self.pending_testing + self.available + self.in_use
    }

    /// Release inspected units from `pending_testing` into `available`
    pub fn complete_testing(&mut self, quantity: Quantity) -> Result<(), LedgerError> {
        if quantity <= 0 || quantity > self.pending_testing {
            return Err(LedgerError::InvalidQuantity {
                entity: "Variant",
                id: self.id,
                requested: quantity,
                limit: self.pending_testing,
            });
        }
        self.pending_testing -= quantity;
        self.available += quantity;
        self.touch();
        Ok(())
    }

    /// Move units from `available` into `in_use`
    pub fn withdraw(&mut self, quantity: Quantity) -> Result<(), LedgerError> {
        self.check_positive(quantity, self.available)?;
        if quantity > self.available {
            return Err(self.insufficient(quantity, self.available));
        }
        self.available -= quantity;
        self.in_use += quantity;
        self.touch();
        Ok(())
    }

    /// Move units from `in_use` back into `available`
    pub fn restore(&mut self, quantity: Quantity) -> Result<(), LedgerError> {
        self.check_positive(quantity, self.in_use)?;
        if quantity > self.in_use {
            return Err(self.insufficient(quantity, self.in_use));
        }
        self.in_use -= quantity;
        self.available += quantity;
        self.touch();
        Ok(())
    }

    /// Remove units from `in_use` permanently (invoiced dispatch)
    pub fn consume(&mut self, quantity: Quantity) -> Result<(), LedgerError> {
        self.check_positive(quantity, self.in_use)?;
        if quantity > self.in_use {
            return Err(self.insufficient(quantity, self.in_use));
        }
        self.in_use -= quantity;
        self.touch();
        Ok(())
    }

    /// Put previously consumed units back into `in_use` (cancelled invoice)
    pub fn reinstate(&mut self, quantity: Quantity) -> Result<(), LedgerError> {
        self.check_positive(quantity, Quantity::MAX)?;
        self.in_use += quantity;
        self.touch();
        Ok(())
    }

    fn check_positive(&self, quantity: Quantity, limit: Quantity) -> Result<(), LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity {
                entity: "Variant",
                id: self.id,
                requested: quantity,
                limit,
            });
        }
        Ok(())
    }

    fn insufficient(&self, requested: Quantity, available: Quantity) -> LedgerError {
        LedgerError::InsufficientQuantity {
            variant_id: self.id,
            requested,
            available,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Variant as returned to callers, with its derived testing status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantView {
    #[serde(flatten)]
    pub variant: Variant,
    pub testing_status: TestingStatus,
}

impl From<Variant> for VariantView {
    fn from(variant: Variant) -> Self {
        let testing_status = variant.testing_status();
        Self {
            variant,
            testing_status,
        }
    }
}
