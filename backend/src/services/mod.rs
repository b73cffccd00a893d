//! Business logic services for the Inventory Ledger
//!
//! Every command runs in one ledger transaction and is recorded under its
//! idempotency key before commit. A retried command finds that record once
//! it holds the stock lock and gets the stored response back unchanged.

pub mod allocation;
pub mod inward;
pub mod production;
pub mod sales;
pub mod stock;
pub mod testing;

pub use allocation::AllocationService;
pub use inward::InwardService;
pub use production::ProductionService;
pub use sales::SalesService;
pub use stock::StockService;
pub use testing::TestingService;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use shared::{CommandRecord, LedgerError, Operation};
use uuid::Uuid;

use crate::error::AppResult;
use crate::store::LedgerTx;

/// A command's idempotency key, operation and request fingerprint
#[derive(Debug, Clone)]
pub struct CommandKey {
    pub key: Uuid,
    pub operation: Operation,
    pub request_hash: String,
}

impl CommandKey {
    /// Fingerprint `request` (SHA-256 over its JSON form, base64 encoded)
    pub fn new<T: Serialize>(key: Uuid, operation: Operation, request: &T) -> AppResult<Self> {
        Ok(Self {
            key,
            operation,
            request_hash: fingerprint(request)?,
        })
    }

    /// The stored response for this command, if it has already been applied.
    ///
    /// Fails with `IdempotencyConflict` when the key was used for a
    /// different operation or a different request body.
    pub async fn replay<X, R>(&self, tx: &mut X) -> AppResult<Option<R>>
    where
        X: LedgerTx,
        R: DeserializeOwned,
    {
        let Some(record) = tx.find_command(self.key).await? else {
            return Ok(None);
        };

        if record.operation != self.operation || record.request_hash != self.request_hash {
            tracing::warn!(
                key = %self.key,
                recorded = %record.operation,
                requested = %self.operation,
                "Idempotency key reused for a different request"
            );
            return Err(LedgerError::IdempotencyConflict {
                key: self.key,
                operation: record.operation,
            }
            .into());
        }

        tracing::debug!(key = %self.key, operation = %self.operation, "Replaying recorded response");
        Ok(Some(serde_json::from_value(record.response)?))
    }

    /// Record `response` under this key in the same transaction as the command
    pub async fn remember<X, R>(&self, tx: &mut X, response: &R) -> AppResult<()>
    where
        X: LedgerTx,
        R: Serialize,
    {
        let record = CommandRecord {
            idempotency_key: self.key,
            operation: self.operation,
            request_hash: self.request_hash.clone(),
            response: serde_json::to_value(response)?,
            created_at: Utc::now(),
        };
        tx.insert_command(&record).await
    }
}

/// SHA-256 of the JSON serialization of `request`, base64 encoded
pub fn fingerprint<T: Serialize>(request: &T) -> AppResult<String> {
    let body = serde_json::to_vec(request)?;
    let digest = Sha256::digest(&body);
    Ok(STANDARD.encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = fingerprint(&json!({"quantity": 10})).unwrap();
        let b = fingerprint(&json!({"quantity": 10})).unwrap();
        let c = fingerprint(&json!({"quantity": 11})).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32 byte digest in padded base64
        assert_eq!(a.len(), 44);
    }
}
