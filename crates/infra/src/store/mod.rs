//! Catalog storage boundary.
//!
//! The reconciliation core never talks to storage; the service reads a
//! snapshot through [`CatalogStore`] and writes back a single [`ChangeSet`].

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryCatalogStore;
pub use postgres::PostgresCatalogStore;
pub use r#trait::{CatalogStore, ChangeSet, Reassignment, StoreError};
