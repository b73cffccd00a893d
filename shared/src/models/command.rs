//! Idempotency records for applied commands

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Operation;

/// The outcome of a command, stored under its idempotency key in the same
/// transaction that applied it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub idempotency_key: Uuid,
    pub operation: Operation,
    /// Fingerprint of the request body
    pub request_hash: String,
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
