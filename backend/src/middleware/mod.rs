//! Request extractors shared by the handlers

pub mod operator;

pub use operator::{Operator, OPERATOR_HEADER};
