//! Batch ledger: which products one import run touched, and by how much.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use restock_catalog::{ImportBatch, ImportBatchItem, Product};
use restock_core::{DomainResult, ProductId};

/// Items of one batch being assembled during a run.
///
/// Holds at most one item per product; recording the same product twice adds
/// to its quantity.
#[derive(Debug, Clone)]
pub struct BatchLedger {
    batch: ImportBatch,
    items: Vec<ImportBatchItem>,
    positions: HashMap<ProductId, usize>,
}

impl BatchLedger {
    pub fn open(label: &str, at: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self::for_batch(ImportBatch::open(label, at)?))
    }

    pub fn for_batch(batch: ImportBatch) -> Self {
        Self {
            batch,
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn batch(&self) -> &ImportBatch {
        &self.batch
    }

    pub fn record(&mut self, product_id: ProductId, quantity: f64) {
        match self.positions.get(&product_id) {
            Some(&pos) => self.items[pos].quantity += quantity,
            None => {
                self.positions.insert(product_id, self.items.len());
                self.items
                    .push(ImportBatchItem::new(self.batch.id, product_id, quantity));
            }
        }
    }

    pub fn items(&self) -> &[ImportBatchItem] {
        &self.items
    }

    pub fn close(self) -> (ImportBatch, Vec<ImportBatchItem>) {
        (self.batch, self.items)
    }
}

/// Ledger listing row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    #[serde(flatten)]
    pub batch: ImportBatch,
    pub item_count: usize,
    pub total_quantity: f64,
}

impl BatchSummary {
    pub fn new(batch: ImportBatch, items: &[ImportBatchItem]) -> Self {
        Self {
            batch,
            item_count: items.len(),
            total_quantity: items.iter().map(|item| item.quantity).sum(),
        }
    }
}

/// One batch item joined with the current state of its product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchLine {
    #[serde(flatten)]
    pub item: ImportBatchItem,
    pub name: String,
    pub sku: Option<String>,
    pub upc: Option<String>,
    pub cost: f64,
    pub selling_price: f64,
    pub stock: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchDetails {
    pub batch: ImportBatch,
    pub lines: Vec<BatchLine>,
}

impl BatchDetails {
    /// Join items with their products. Items whose product is missing are dropped.
    pub fn assemble(batch: ImportBatch, items: Vec<ImportBatchItem>, products: &[Product]) -> Self {
        let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();
        let lines = items
            .into_iter()
            .filter_map(|item| {
                let product = by_id.get(&item.product_id)?;
                Some(BatchLine {
                    name: product.name.clone(),
                    sku: product.sku.clone(),
                    upc: product.upc.clone(),
                    cost: product.cost,
                    selling_price: product.selling_price,
                    stock: product.stock,
                    item,
                })
            })
            .collect();
        Self { batch, lines }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restock_catalog::NewProduct;

    #[test]
    fn one_item_per_product() {
        let mut ledger = BatchLedger::open("factura-7.xml", Utc::now()).unwrap();
        let a = ProductId::new();
        let b = ProductId::new();
        ledger.record(a, 2.0);
        ledger.record(b, 1.0);
        ledger.record(a, 3.0);

        let (batch, items) = ledger.close();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_id, a);
        assert_eq!(items[0].quantity, 5.0);
        assert!(items.iter().all(|item| item.batch_id == batch.id));
    }

    #[test]
    fn summary_totals_items() {
        let ledger = {
            let mut l = BatchLedger::open("f.xml", Utc::now()).unwrap();
            l.record(ProductId::new(), 1.5);
            l.record(ProductId::new(), 2.5);
            l
        };
        let summary = BatchSummary::new(ledger.batch().clone(), ledger.items());
        assert_eq!(summary.item_count, 2);
        assert_eq!(summary.total_quantity, 4.0);
    }

    #[test]
    fn details_join_products_and_skip_orphans() {
        let product = Product::create(NewProduct {
            name: "Tornillo".to_string(),
            sku: Some("X1".to_string()),
            cost: 1.0,
            stock: 15.0,
            ..NewProduct::default()
        })
        .unwrap();
        let mut ledger = BatchLedger::open("f.xml", Utc::now()).unwrap();
        ledger.record(product.id, 15.0);
        ledger.record(ProductId::new(), 1.0);
        let (batch, items) = ledger.close();

        let details = BatchDetails::assemble(batch, items, std::slice::from_ref(&product));
        assert_eq!(details.lines.len(), 1);
        assert_eq!(details.lines[0].sku.as_deref(), Some("X1"));
        assert_eq!(details.lines[0].stock, 15.0);
    }
}
