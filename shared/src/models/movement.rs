//! Append-only movement ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Variant;
use crate::types::Quantity;

/// Ledger-tracked quantity bucket of a variant.
///
/// `pending_testing` is pre-ledger and has no bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Available,
    InUse,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Available => "available",
            Bucket::InUse => "in_use",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(Bucket::Available),
            "in_use" => Some(Bucket::InUse),
            _ => None,
        }
    }

    /// Current level of this bucket on a variant
    pub fn level(&self, variant: &Variant) -> Quantity {
        match self {
            Bucket::Available => variant.available,
            Bucket::InUse => variant.in_use,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            _ => None,
        }
    }
}

/// What caused a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Inward,
    Testing,
    Production,
    SalesReturn,
    Invoice,
    Dc,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Inward => "inward",
            ReferenceType::Testing => "testing",
            ReferenceType::Production => "production",
            ReferenceType::SalesReturn => "sales_return",
            ReferenceType::Invoice => "invoice",
            ReferenceType::Dc => "dc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let reference = match value {
            "inward" => ReferenceType::Inward,
            "testing" => ReferenceType::Testing,
            "production" => ReferenceType::Production,
            "sales_return" => ReferenceType::SalesReturn,
            "invoice" => ReferenceType::Invoice,
            "dc" => ReferenceType::Dc,
            _ => return None,
        };
        Some(reference)
    }
}

/// Immutable ledger entry for one bucket of one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub bucket: Bucket,
    pub direction: Direction,
    pub quantity: Quantity,
    /// Level of `bucket` right after this movement
    pub remaining_quantity: Quantity,
    pub reference_type: ReferenceType,
    pub reference_id: Option<Uuid>,
    pub operator: Option<String>,
    pub idempotency_key: Uuid,
    pub created_at: DateTime<Utc>,
}

/// The command-level facts shared by every movement a command writes
#[derive(Debug, Clone)]
pub struct MovementContext {
    pub reference_type: ReferenceType,
    pub reference_id: Option<Uuid>,
    pub operator: Option<String>,
    pub idempotency_key: Uuid,
}

impl MovementContext {
    pub fn new(reference_type: ReferenceType, idempotency_key: Uuid) -> Self {
        Self {
            reference_type,
            reference_id: None,
            operator: None,
            idempotency_key,
        }
    }

    pub fn reference(mut self, id: Uuid) -> Self {
        self.reference_id = Some(id);
        self
    }

    pub fn operator(mut self, operator: Option<String>) -> Self {
        self.operator = operator;
        self
    }
}

impl Movement {
    /// Record a movement against a variant that has already been mutated
    pub fn record(
        variant: &Variant,
        bucket: Bucket,
        direction: Direction,
        quantity: Quantity,
        ctx: &MovementContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            variant_id: variant.id,
            bucket,
            direction,
            quantity,
            remaining_quantity: bucket.level(variant),
            reference_type: ctx.reference_type,
            reference_id: ctx.reference_id,
            operator: ctx.operator.clone(),
            idempotency_key: ctx.idempotency_key,
            created_at: Utc::now(),
        }
    }

    /// The two legs of a transfer between buckets
    pub fn transfer(
        variant: &Variant,
        from: Bucket,
        to: Bucket,
        quantity: Quantity,
        ctx: &MovementContext,
    ) -> [Self; 2] {
        [
            Self::record(variant, from, Direction::Out, quantity, ctx),
            Self::record(variant, to, Direction::In, quantity, ctx),
        ]
    }

    pub fn signed_quantity(&self) -> Quantity {
        match self.direction {
            Direction::In => self.quantity,
            Direction::Out => -self.quantity,
        }
    }
}
