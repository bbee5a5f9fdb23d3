//! Catalog domain module.
//!
//! Products, their append-only price history, and the import-batch ledger
//! records. Pure domain logic: no IO, no HTTP, no storage.

pub mod batch;
pub mod history;
pub mod product;

pub use batch::{ImportBatch, ImportBatchItem};
pub use history::{PriceChangeKind, PriceHistory};
pub use product::{NewProduct, Product, clean_code};
