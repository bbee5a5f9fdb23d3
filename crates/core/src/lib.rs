//! `restock-core`: shared building blocks for the catalog reconciliation crates.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{BatchId, BatchItemId, PriceHistoryId, ProductId};
