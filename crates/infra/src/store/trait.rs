use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use restock_catalog::{ImportBatch, ImportBatchItem, PriceHistory, Product};
use restock_core::{BatchId, ProductId};
use restock_reconcile::{BatchSummary, ReconcileError};

/// Storage operation error.
///
/// These are infrastructure failures, as opposed to the domain validation
/// errors raised before anything reaches the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint (SKU, UPC, batch label) was violated at write time.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Dangling reference or rejected row.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ReconcileError::Conflict(msg),
            StoreError::NotFound(what) => ReconcileError::NotFound(what),
            other => ReconcileError::Persistence(other.to_string()),
        }
    }
}

/// Every reference to `from` moves to `to` (history rows and batch items).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reassignment {
    pub from: ProductId,
    pub to: ProductId,
}

/// A unit of work applied all-or-nothing by [`CatalogStore::commit`].
///
/// Applied in this order: batch, reassignments, deletions, creations,
/// updates, price history, batch items.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub batch: Option<ImportBatch>,
    pub batch_items: Vec<ImportBatchItem>,
    pub created: Vec<Product>,
    pub updated: Vec<Product>,
    pub deleted: Vec<ProductId>,
    pub history: Vec<PriceHistory>,
    pub reassignments: Vec<Reassignment>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.batch.is_none()
            && self.batch_items.is_empty()
            && self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.history.is_empty()
            && self.reassignments.is_empty()
    }
}

/// Transactional catalog, price-history and batch-ledger storage.
///
/// Implementations must:
/// - enforce SKU/UPC uniqueness (among non-empty values) and batch-label uniqueness
/// - apply a [`ChangeSet`] atomically: on error, nothing of it is visible
/// - report unique violations as [`StoreError::Conflict`]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Full catalog, oldest product first.
    async fn list_all_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn find_batch_by_label(&self, label: &str) -> Result<Option<ImportBatch>, StoreError>;

    async fn get_batch(&self, id: BatchId) -> Result<Option<ImportBatch>, StoreError>;

    /// Newest batch first.
    async fn list_batches(&self) -> Result<Vec<BatchSummary>, StoreError>;

    async fn list_items_for_batch(&self, id: BatchId) -> Result<Vec<ImportBatchItem>, StoreError>;

    /// Price history of one product, newest first.
    async fn list_history(&self, id: ProductId) -> Result<Vec<PriceHistory>, StoreError>;

    async fn rename_batch(&self, id: BatchId, label: &str) -> Result<ImportBatch, StoreError>;

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;

    async fn create_product(&self, product: Product) -> Result<ProductId, StoreError> {
        let id = product.id;
        self.commit(ChangeSet {
            created: vec![product],
            ..ChangeSet::default()
        })
        .await?;
        Ok(id)
    }

    async fn update_product(&self, product: Product) -> Result<(), StoreError> {
        self.commit(ChangeSet {
            updated: vec![product],
            ..ChangeSet::default()
        })
        .await
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        self.commit(ChangeSet {
            deleted: vec![id],
            ..ChangeSet::default()
        })
        .await
    }
}

#[async_trait]
impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    async fn list_all_products(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list_all_products().await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id).await
    }

    async fn find_batch_by_label(&self, label: &str) -> Result<Option<ImportBatch>, StoreError> {
        (**self).find_batch_by_label(label).await
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<ImportBatch>, StoreError> {
        (**self).get_batch(id).await
    }

    async fn list_batches(&self) -> Result<Vec<BatchSummary>, StoreError> {
        (**self).list_batches().await
    }

    async fn list_items_for_batch(&self, id: BatchId) -> Result<Vec<ImportBatchItem>, StoreError> {
        (**self).list_items_for_batch(id).await
    }

    async fn list_history(&self, id: ProductId) -> Result<Vec<PriceHistory>, StoreError> {
        (**self).list_history(id).await
    }

    async fn rename_batch(&self, id: BatchId, label: &str) -> Result<ImportBatch, StoreError> {
        (**self).rename_batch(id, label).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        (**self).commit(changes).await
    }

    async fn create_product(&self, product: Product) -> Result<ProductId, StoreError> {
        (**self).create_product(product).await
    }

    async fn update_product(&self, product: Product) -> Result<(), StoreError> {
        (**self).update_product(product).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        (**self).delete_product(id).await
    }
}
