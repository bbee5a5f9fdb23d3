use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{debug, instrument};

use restock_catalog::{ImportBatch, ImportBatchItem, PriceHistory, Product};
use restock_core::{BatchId, Entity, ProductId};
use restock_reconcile::{BatchSummary, fold_batch_items};

use super::r#trait::{CatalogStore, ChangeSet, StoreError};

#[derive(Debug, Clone, Default)]
struct State {
    /// Keyed by UUIDv7, so iteration is creation order.
    products: BTreeMap<ProductId, Product>,
    history: Vec<PriceHistory>,
    batches: Vec<ImportBatch>,
    items: Vec<ImportBatchItem>,
}

/// In-memory catalog store.
///
/// Intended for tests/dev. Commits are applied to a staged copy which replaces
/// the live state only when every check passed.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    state: RwLock<State>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `products`.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let state = State {
            products: keyed(products),
            ..State::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

/// Rows keyed by their entity id; a later duplicate replaces the earlier one.
fn keyed<E>(rows: impl IntoIterator<Item = E>) -> BTreeMap<E::Id, E>
where
    E: Entity,
    E::Id: Ord,
{
    rows.into_iter().map(|row| (row.id(), row)).collect()
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn list_all_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.read()?.products.values().cloned().collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn find_batch_by_label(&self, label: &str) -> Result<Option<ImportBatch>, StoreError> {
        Ok(self
            .read()?
            .batches
            .iter()
            .find(|b| b.label == label)
            .cloned())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<ImportBatch>, StoreError> {
        Ok(self.read()?.batches.iter().find(|b| b.id == id).cloned())
    }

    async fn list_batches(&self) -> Result<Vec<BatchSummary>, StoreError> {
        let state = self.read()?;
        let mut summaries: Vec<BatchSummary> = state
            .batches
            .iter()
            .map(|batch| {
                let items: Vec<ImportBatchItem> = state
                    .items
                    .iter()
                    .filter(|item| item.batch_id == batch.id)
                    .cloned()
                    .collect();
                BatchSummary::new(batch.clone(), &items)
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.batch
                .created_at
                .cmp(&a.batch.created_at)
                .then_with(|| b.batch.id.cmp(&a.batch.id))
        });
        Ok(summaries)
    }

    async fn list_items_for_batch(&self, id: BatchId) -> Result<Vec<ImportBatchItem>, StoreError> {
        Ok(self
            .read()?
            .items
            .iter()
            .filter(|item| item.batch_id == id)
            .cloned()
            .collect())
    }

    async fn list_history(&self, id: ProductId) -> Result<Vec<PriceHistory>, StoreError> {
        let mut entries: Vec<PriceHistory> = self
            .read()?
            .history
            .iter()
            .filter(|h| h.product_id == id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.recorded_at
                .cmp(&a.recorded_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    async fn rename_batch(&self, id: BatchId, label: &str) -> Result<ImportBatch, StoreError> {
        let mut state = self.write()?;
        if state.batches.iter().any(|b| b.label == label && b.id != id) {
            return Err(StoreError::Conflict(format!("batch label '{label}' already exists")));
        }
        let batch = state
            .batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("batch {id}")))?;
        batch.label = label.to_string();
        Ok(batch.clone())
    }

    #[instrument(
        skip(self, changes),
        fields(
            created = changes.created.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            history = changes.history.len(),
            items = changes.batch_items.len()
        ),
        err
    )]
    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut state = self.write()?;
        let mut staged = state.clone();
        apply(&mut staged, changes)?;
        *state = staged;
        debug!("change set committed");
        Ok(())
    }
}

fn apply(state: &mut State, changes: ChangeSet) -> Result<(), StoreError> {
    if let Some(batch) = changes.batch {
        if state.batches.iter().any(|b| b.label == batch.label) {
            return Err(StoreError::Conflict(format!(
                "batch label '{}' already exists",
                batch.label
            )));
        }
        if state.batches.iter().any(|b| b.id() == batch.id()) {
            return Err(StoreError::Conflict(format!("batch {} already exists", batch.id)));
        }
        state.batches.push(batch);
    }

    for r in changes.reassignments {
        if !state.products.contains_key(&r.to) {
            return Err(StoreError::Integrity(format!("reassignment target {} missing", r.to)));
        }
        for entry in state.history.iter_mut().filter(|h| h.product_id == r.from) {
            entry.product_id = r.to;
        }
        state.items = fold_batch_items(std::mem::take(&mut state.items), r.from, r.to);
    }

    for id in changes.deleted {
        if state.products.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("product {id}")));
        }
        state.history.retain(|h| h.product_id != id);
        state.items.retain(|i| i.product_id != id);
    }

    for product in changes.created {
        if state.products.contains_key(&product.id) {
            return Err(StoreError::Conflict(format!("product {} already exists", product.id)));
        }
        state.products.insert(product.id, product);
    }

    for product in changes.updated {
        match state.products.get_mut(&product.id) {
            Some(slot) => *slot = product,
            None => return Err(StoreError::NotFound(format!("product {}", product.id))),
        }
    }

    ensure_unique_codes(state.products.values())?;

    for entry in changes.history {
        if !state.products.contains_key(&entry.product_id) {
            return Err(StoreError::Integrity(format!(
                "price history references missing product {}",
                entry.product_id
            )));
        }
        state.history.push(entry);
    }

    let mut pairs: HashSet<(BatchId, ProductId)> =
        state.items.iter().map(|i| (i.batch_id, i.product_id)).collect();
    for item in changes.batch_items {
        if !state.batches.iter().any(|b| b.id == item.batch_id) {
            return Err(StoreError::Integrity(format!("batch {} missing", item.batch_id)));
        }
        if !state.products.contains_key(&item.product_id) {
            return Err(StoreError::Integrity(format!(
                "batch item references missing product {}",
                item.product_id
            )));
        }
        if !pairs.insert((item.batch_id, item.product_id)) {
            return Err(StoreError::Conflict(format!(
                "product {} already linked to batch {}",
                item.product_id, item.batch_id
            )));
        }
        state.items.push(item);
    }

    Ok(())
}

fn ensure_unique_codes<'a>(products: impl Iterator<Item = &'a Product>) -> Result<(), StoreError> {
    let mut skus: HashMap<&str, ProductId> = HashMap::new();
    let mut upcs: HashMap<&str, ProductId> = HashMap::new();
    for p in products {
        if let Some(sku) = p.sku() {
            if let Some(other) = skus.insert(sku, p.id) {
                return Err(StoreError::Conflict(format!(
                    "sku '{sku}' held by products {other} and {}",
                    p.id
                )));
            }
        }
        if let Some(upc) = p.upc() {
            if let Some(other) = upcs.insert(upc, p.id) {
                return Err(StoreError::Conflict(format!(
                    "upc '{upc}' held by products {other} and {}",
                    p.id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Reassignment;
    use chrono::Utc;
    use restock_catalog::{NewProduct, PriceChangeKind};

    fn product(name: &str, sku: Option<&str>) -> Product {
        Product::create(NewProduct {
            name: name.to_string(),
            sku: sku.map(str::to_string),
            cost: 1.0,
            ..NewProduct::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn failed_commit_leaves_nothing_behind() {
        let store = InMemoryCatalogStore::with_products(vec![product("A", Some("X1"))]);
        let batch = ImportBatch::open("f.xml", Utc::now()).unwrap();
        let dup = product("B", Some("X1"));
        let fresh = product("C", None);

        let err = store
            .commit(ChangeSet {
                batch: Some(batch),
                created: vec![fresh, dup],
                ..ChangeSet::default()
            })
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(store.list_all_products().await.unwrap().len(), 1);
        assert!(store.find_batch_by_label("f.xml").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_labels_are_unique() {
        let store = InMemoryCatalogStore::new();
        let first = ImportBatch::open("f.xml", Utc::now()).unwrap();
        store
            .commit(ChangeSet {
                batch: Some(first),
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        let again = ImportBatch::open("f.xml", Utc::now()).unwrap();
        let err = store
            .commit(ChangeSet {
                batch: Some(again),
                ..ChangeSet::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleting_a_product_cascades_to_its_rows() {
        let p = product("A", None);
        let store = InMemoryCatalogStore::with_products(vec![p.clone()]);
        let batch = ImportBatch::open("f.xml", Utc::now()).unwrap();
        store
            .commit(ChangeSet {
                batch_items: vec![ImportBatchItem::new(batch.id, p.id, 2.0)],
                batch: Some(batch.clone()),
                history: vec![PriceHistory::opening(p.id, PriceChangeKind::Cost, 1.0, Utc::now())],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        store.delete_product(p.id).await.unwrap();
        assert!(store.list_history(p.id).await.unwrap().is_empty());
        assert!(store.list_items_for_batch(batch.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reassignment_moves_history_and_folds_items() {
        let keep = product("Keep", None);
        let gone = product("Gone", None);
        let store = InMemoryCatalogStore::with_products(vec![keep.clone(), gone.clone()]);
        let batch = ImportBatch::open("f.xml", Utc::now()).unwrap();
        store
            .commit(ChangeSet {
                batch_items: vec![
                    ImportBatchItem::new(batch.id, keep.id, 1.0),
                    ImportBatchItem::new(batch.id, gone.id, 2.0),
                ],
                batch: Some(batch.clone()),
                history: vec![PriceHistory::opening(gone.id, PriceChangeKind::Cost, 1.0, Utc::now())],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        store
            .commit(ChangeSet {
                reassignments: vec![Reassignment {
                    from: gone.id,
                    to: keep.id,
                }],
                deleted: vec![gone.id],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        let items = store.list_items_for_batch(batch.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3.0);
        assert_eq!(store.list_history(keep.id).await.unwrap().len(), 1);
        assert!(store.get_product(gone.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_rejects_taken_labels() {
        let store = InMemoryCatalogStore::new();
        let a = ImportBatch::open("a.xml", Utc::now()).unwrap();
        let b = ImportBatch::open("b.xml", Utc::now()).unwrap();
        for batch in [a.clone(), b.clone()] {
            store
                .commit(ChangeSet {
                    batch: Some(batch),
                    ..ChangeSet::default()
                })
                .await
                .unwrap();
        }
        assert!(matches!(
            store.rename_batch(b.id, "a.xml").await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.rename_batch(b.id, "c.xml").await.unwrap().label, "c.xml");
        assert!(matches!(
            store.rename_batch(BatchId::new(), "d.xml").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
