//! Part-level stock aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounting::StockTotals;
use crate::types::Quantity;

/// Aggregate identity for one part number.
///
/// `available`, `in_use`, `pending_testing` and `average_cost` are derived
/// from the stock's variants and are only written through [`Stock::apply_totals`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub id: Uuid,
    pub part_no: String,
    pub name: String,
    /// List price
    pub unit_price: Decimal,
    /// Weighted-average cost over every bucket of every variant
    pub average_cost: Decimal,
    pub total_received: Quantity,
    pub available: Quantity,
    pub in_use: Quantity,
    pub pending_testing: Quantity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stock {
    /// A new, empty stock shell for a part number
    pub fn new(part_no: impl Into<String>, name: impl Into<String>, unit_price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            part_no: part_no.into(),
            name: name.into(),
            unit_price,
            average_cost: Decimal::ZERO,
            total_received: 0,
            available: 0,
            in_use: 0,
            pending_testing: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_totals(&mut self, totals: &StockTotals) {
        self.available = totals.available;
        self.in_use = totals.in_use;
        self.pending_testing = totals.pending_testing;
        self.average_cost = totals.average_cost;
        self.updated_at = Utc::now();
    }

    pub fn totals(&self) -> StockTotals {
        StockTotals {
            available: self.available,
            in_use: self.in_use,
            pending_testing: self.pending_testing,
            average_cost: self.average_cost,
        }
    }

    /// Units physically held, whatever their state
    pub fn on_hand(&self) -> Quantity {
        self.available + self.in_use + self.pending_testing
    }
}
