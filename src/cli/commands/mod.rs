//! CLI command implementations

pub mod config;
pub mod transfer;

pub use config::execute as config;
pub use transfer::{extract, inject};
