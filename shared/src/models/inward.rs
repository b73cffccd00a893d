//! Inward (goods receipt) documents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{TestingStatus, VariantView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InwardStatus {
    Draft,
    Finalized,
}

impl InwardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InwardStatus::Draft => "draft",
            InwardStatus::Finalized => "finalized",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(InwardStatus::Draft),
            "finalized" => Some(InwardStatus::Finalized),
            _ => None,
        }
    }
}

/// Groups the lots received together from one supplier delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InwardDocument {
    pub id: Uuid,
    pub document_no: String,
    pub supplier: Option<String>,
    pub status: InwardStatus,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl InwardDocument {
    pub fn draft(document_no: impl Into<String>, supplier: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_no: document_no.into(),
            supplier,
            status: InwardStatus::Draft,
            created_at: Utc::now(),
            finalized_at: None,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == InwardStatus::Draft
    }

    pub fn finalize(&mut self) {
        self.status = InwardStatus::Finalized;
        self.finalized_at = Some(Utc::now());
    }
}

/// An inward document together with its lots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InwardDocumentView {
    #[serde(flatten)]
    pub document: InwardDocument,
    pub variants: Vec<VariantView>,
}

impl InwardDocumentView {
    /// Number of lots that still have units awaiting inspection
    pub fn open_variants(&self) -> usize {
        self.variants
            .iter()
            .filter(|v| v.testing_status != TestingStatus::Completed)
            .count()
    }
}
