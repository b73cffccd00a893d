//! Validation helpers for identifiers and prices entering the ledger

use rust_decimal::Decimal;

use crate::accounting::COST_SCALE;

/// Largest price a stock or lot can carry (NUMERIC(14, 2))
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// Validate a scan code (barcode printed on a received lot)
pub fn validate_scan_code(code: &str) -> Result<(), &'static str> {
    if code.trim().is_empty() {
        return Err("Scan code must not be empty");
    }
    if code.len() > 64 {
        return Err("Scan code must be at most 64 characters");
    }
    if code.chars().any(char::is_whitespace) {
        return Err("Scan code must not contain whitespace");
    }
    Ok(())
}

/// Validate a part number (uppercase alphanumeric with `-`, `_`, `/` or `.`)
pub fn validate_part_no(part_no: &str) -> Result<(), &'static str> {
    if part_no.is_empty() {
        return Err("Part number must not be empty");
    }
    if part_no.len() > 40 {
        return Err("Part number must be at most 40 characters");
    }
    if !part_no
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '/' | '.'))
    {
        return Err("Part number must be uppercase alphanumeric");
    }
    Ok(())
}

/// Validate an invoice, delivery chalan or inward document number
pub fn validate_document_no(document_no: &str) -> Result<(), &'static str> {
    if document_no.trim().is_empty() {
        return Err("Document number must not be empty");
    }
    if document_no.len() > 50 {
        return Err("Document number must be at most 50 characters");
    }
    Ok(())
}

/// Validate a unit price
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    if price > MAX_UNIT_PRICE {
        return Err("Unit price must be at most 999999999999.99");
    }
    if price.normalize().scale() > COST_SCALE {
        return Err("Unit price must have at most two decimal places");
    }
    Ok(())
}

/// Normalise a part number as typed by an operator
pub fn normalize_part_no(part_no: &str) -> String {
    part_no.trim().to_ascii_uppercase()
}
