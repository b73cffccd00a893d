//! Stock aggregation and weighted-average costing
//!
//! A stock's quantities and cost are never edited directly; they are
//! recomputed from its variants with [`aggregate`] after every variant change.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Bucket, Movement, Stock, Variant};
use crate::types::Quantity;

/// Decimal places kept on costs and prices
pub const COST_SCALE: u32 = 2;

/// The derived part of a [`Stock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockTotals {
    pub available: Quantity,
    pub in_use: Quantity,
    pub pending_testing: Quantity,
    pub average_cost: Decimal,
}

/// Quantity-weighted mean of `(quantity, price)` pairs.
///
/// Zero total quantity yields a zero cost; `None` if the total value does
/// not fit in a `Decimal`.
pub fn weighted_average<I>(lines: I) -> Option<Decimal>
where
    I: IntoIterator<Item = (Quantity, Decimal)>,
{
    let mut value = Decimal::ZERO;
    let mut quantity = Decimal::ZERO;
    for (q, price) in lines {
        let q = Decimal::from(q);
        value = value.checked_add(q.checked_mul(price)?)?;
        quantity = quantity.checked_add(q)?;
    }

    if quantity.is_zero() {
        return Some(Decimal::ZERO);
    }

    value
        .checked_div(quantity)
        .map(|avg| avg.round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero))
}

/// Roll every bucket of every variant up into stock totals.
///
/// `None` when a total overflows.
pub fn aggregate(variants: &[Variant]) -> Option<StockTotals> {
    let mut totals = StockTotals {
        average_cost: weighted_average(variants.iter().map(|v| (v.total_quantity(), v.unit_price)))?,
        ..StockTotals::default()
    };
    for v in variants {
        totals.available = totals.available.checked_add(v.available)?;
        totals.in_use = totals.in_use.checked_add(v.in_use)?;
        totals.pending_testing = totals.pending_testing.checked_add(v.pending_testing)?;
    }
    Some(totals)
}

/// Signed movement total for one bucket of one variant
pub fn ledger_balance(movements: &[Movement], variant_id: Uuid, bucket: Bucket) -> Quantity {
    movements
        .iter()
        .filter(|m| m.variant_id == variant_id && m.bucket == bucket)
        .map(Movement::signed_quantity)
        .sum()
}

/// Result of checking a stock against its variants and movement ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub stock_id: Uuid,
    pub part_no: String,
    pub variant_count: usize,
    pub movement_count: usize,
    pub consistent: bool,
    pub issues: Vec<String>,
}

/// Verify the conservation rules for one stock
pub fn audit(stock: &Stock, variants: &[Variant], movements: &[Movement]) -> LedgerAudit {
    let mut issues = Vec::new();

    match aggregate(variants) {
        Some(expected) if stock.totals() != expected => issues.push(format!(
            "stock totals {:?} do not match variant totals {:?}",
            stock.totals(),
            expected
        )),
        Some(_) => {}
        None => issues.push("variant totals overflow".to_string()),
    }

    for v in variants {
        if v.pending_testing < 0 || v.available < 0 || v.in_use < 0 {
            issues.push(format!("variant {} has a negative bucket", v.scan_code));
        }
        for bucket in [Bucket::Available, Bucket::InUse] {
            let ledger = ledger_balance(movements, v.id, bucket);
            let level = bucket.level(v);
            if ledger != level {
                issues.push(format!(
                    "variant {} {} is {} but its movements sum to {}",
                    v.scan_code,
                    bucket.as_str(),
                    level,
                    ledger
                ));
            }
        }
    }

    LedgerAudit {
        stock_id: stock.id,
        part_no: stock.part_no.clone(),
        variant_count: variants.len(),
        movement_count: movements.len(),
        consistent: issues.is_empty(),
        issues,
    }
}
