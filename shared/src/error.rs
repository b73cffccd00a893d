//! Ledger rule violations
//!
//! Every variant is raised by a precondition check before anything is
//! mutated, so a rejected command never leaves partial state behind. None of
//! them is worth retrying unchanged.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{DocumentKind, Operation, Quantity};

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("scan code {scan_code} has already been received")]
    DuplicateReceipt { scan_code: String },

    #[error("invalid quantity {requested} for {entity} {id} (allowed 1..={limit})")]
    InvalidQuantity {
        entity: &'static str,
        id: Uuid,
        requested: Quantity,
        limit: Quantity,
    },

    #[error("variant {variant_id} has {available} unit(s) available, {requested} requested")]
    InsufficientQuantity {
        variant_id: Uuid,
        requested: Quantity,
        available: Quantity,
    },

    #[error("sale {sale_id} has {remaining} unit(s) left for {document}, {requested} requested")]
    OverAllocation {
        sale_id: Uuid,
        document: DocumentKind,
        requested: Quantity,
        remaining: Quantity,
    },

    #[error("inward document {inward_id} still has {open_variants} variant(s) under testing")]
    IncompleteTesting { inward_id: Uuid, open_variants: usize },

    #[error("sale {sale_id} has {invoiced} invoiced unit(s) that cannot be released")]
    InvoicedQuantity {
        sale_id: Uuid,
        requested: Quantity,
        invoiced: Quantity,
    },

    #[error("inward document {inward_id} cannot be changed: {reason}")]
    InwardLocked { inward_id: Uuid, reason: String },

    #[error("idempotency key {key} was already used for a different {operation} request")]
    IdempotencyConflict { key: Uuid, operation: Operation },
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::DuplicateReceipt { .. } => "DUPLICATE_RECEIPT",
            LedgerError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            LedgerError::InsufficientQuantity { .. } => "INSUFFICIENT_QUANTITY",
            LedgerError::OverAllocation { .. } => "OVER_ALLOCATION",
            LedgerError::IncompleteTesting { .. } => "INCOMPLETE_TESTING",
            LedgerError::InvoicedQuantity { .. } => "INVOICED_QUANTITY",
            LedgerError::InwardLocked { .. } => "INWARD_LOCKED",
            LedgerError::IdempotencyConflict { .. } => "IDEMPOTENCY_CONFLICT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_details_serialize_with_kind_tag() {
        let id = Uuid::nil();
        let err = LedgerError::OverAllocation {
            sale_id: id,
            document: DocumentKind::Invoice,
            requested: 20,
            remaining: 15,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "over_allocation");
        assert_eq!(json["requested"], 20);
        assert_eq!(json["remaining"], 15);
        assert_eq!(json["document"], "invoice");
        assert_eq!(err.code(), "OVER_ALLOCATION");
    }

    #[test]
    fn test_not_found_message() {
        let err = LedgerError::not_found("Variant", "abc");
        assert_eq!(err.to_string(), "Variant abc not found");
    }
}
