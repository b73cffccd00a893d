//! Ledger entities

mod command;
mod inward;
mod movement;
mod sale;
mod stock;
mod variant;

pub use command::*;
pub use inward::*;
pub use movement::*;
pub use sale::*;
pub use stock::*;
pub use variant::*;
