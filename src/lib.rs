//! cache-dance - BuildKit cache mount transfer
//!
//! Materialises BuildKit cache mounts as plain directories so CI cache
//! actions can persist them between ephemeral runners.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod orchestration;

pub use error::{DanceError, DanceResult};
