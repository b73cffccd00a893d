//! HTTP handlers

pub mod allocation;
pub mod catalog;
pub mod health;
pub mod inward;
pub mod production;
pub mod sales;
pub mod stock;
pub mod testing;

pub use allocation::*;
pub use catalog::*;
pub use health::*;
pub use inward::*;
pub use production::*;
pub use sales::*;
pub use stock::*;
pub use testing::*;
