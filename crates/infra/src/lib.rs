//! Infrastructure layer: storage adapters, document extractors and the
//! service that runs reconciliation against them.

pub mod document;
pub mod service;
pub mod store;

pub use document::{CfdiExtractor, TextLineExtractor};
pub use service::{
    CodeUpdate, CodeUpdateOutcome, ManualProduct, PriceUpdate, PriceUpdateOutcome, PriceUpdateSkip,
    ReconciliationService,
};
pub use store::{
    CatalogStore, ChangeSet, InMemoryCatalogStore, PostgresCatalogStore, Reassignment, StoreError,
};
