//! Common types used across the ledger

use serde::{Deserialize, Serialize};

/// Whole units of a part
pub type Quantity = i64;

/// Kind of downstream document that can claim a sale's quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    DeliveryChalan,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Invoice => write!(f, "invoice"),
            DocumentKind::DeliveryChalan => write!(f, "delivery chalan"),
        }
    }
}

/// Commands recorded against an idempotency key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateInward,
    DeleteInward,
    FinalizeInward,
    Receive,
    CompleteTesting,
    WithdrawToProduction,
    ReturnFromProduction,
    RecordSale,
    ReverseSale,
    DeleteSale,
    AllocateInvoice,
    AllocateDc,
    CancelInvoice,
    CancelDc,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateInward => "create_inward",
            Operation::DeleteInward => "delete_inward",
            Operation::FinalizeInward => "finalize_inward",
            Operation::Receive => "receive",
            Operation::CompleteTesting => "complete_testing",
            Operation::WithdrawToProduction => "withdraw_to_production",
            Operation::ReturnFromProduction => "return_from_production",
            Operation::RecordSale => "record_sale",
            Operation::ReverseSale => "reverse_sale",
            Operation::DeleteSale => "delete_sale",
            Operation::AllocateInvoice => "allocate_invoice",
            Operation::AllocateDc => "allocate_dc",
            Operation::CancelInvoice => "cancel_invoice",
            Operation::CancelDc => "cancel_dc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let op = match value {
            "create_inward" => Operation::CreateInward,
            "delete_inward" => Operation::DeleteInward,
            "finalize_inward" => Operation::FinalizeInward,
            "receive" => Operation::Receive,
            "complete_testing" => Operation::CompleteTesting,
            "withdraw_to_production" => Operation::WithdrawToProduction,
            "return_from_production" => Operation::ReturnFromProduction,
            "record_sale" => Operation::RecordSale,
            "reverse_sale" => Operation::ReverseSale,
            "delete_sale" => Operation::DeleteSale,
            "allocate_invoice" => Operation::AllocateInvoice,
            "allocate_dc" => Operation::AllocateDc,
            "cancel_invoice" => Operation::CancelInvoice,
            "cancel_dc" => Operation::CancelDc,
            _ => return None,
        };
        Some(op)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
