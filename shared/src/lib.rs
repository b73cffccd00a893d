//! Shared domain types for the Inventory Ledger
//!
//! This crate holds the stock accounting rules that do not depend on any
//! storage or transport: the entities, the per-lot quantity state machine,
//! stock aggregation and weighted-average costing, and the error taxonomy.

pub mod accounting;
pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use accounting::*;
pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
