//! External integrations

pub mod catalog;

pub use catalog::{CsvPartCatalog, HttpPartCatalog, NoCatalog, PartCatalog, PartInfo};
