//! Reconciliation service: the IO shell around the pure planner.
//!
//! Every mutating operation reads what it needs, computes the full change set
//! in memory and hands it to [`CatalogStore::commit`] once. A failed commit
//! leaves the catalog exactly as it was.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use restock_catalog::{
    ImportBatch, NewProduct, PriceChangeKind, PriceHistory, Product, clean_code,
};
use restock_core::{BatchId, ProductId};
use restock_reconcile::{
    BatchDetails, BatchLedger, BatchSummary, CatalogIndex, CodeField, DuplicateCodeError,
    LineError, LineItemExtractor, RawLineItem, ReconcileConfig, ReconcileError, ReconcileResult,
    ReconciliationEngine, ReconciliationPlan, ReconciliationReport, aggregate_lines,
    normalize_code, normalize_name, plan_merge,
};

use crate::store::{CatalogStore, ChangeSet, Reassignment};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceUpdate {
    pub product_id: ProductId,
    pub selling_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceUpdateSkip {
    pub product_id: ProductId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceUpdateOutcome {
    pub updated: usize,
    pub skipped: Vec<PriceUpdateSkip>,
}

/// New SKU/UPC for a product. `None` leaves a field alone, `Some("")` clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CodeUpdate {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub upc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeUpdateOutcome {
    pub product: Product,
    /// Fields left unchanged because another product holds the code.
    pub rejected: Vec<DuplicateCodeError>,
}

/// Product entered by hand rather than from a document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ManualProduct {
    pub name: String,
    pub sku: Option<String>,
    pub upc: Option<String>,
    pub description: Option<String>,
    pub cost: f64,
    pub selling_price: f64,
    pub stock: f64,
}

pub struct ReconciliationService<S> {
    store: S,
    config: ReconcileConfig,
}

impl<S> ReconciliationService<S>
where
    S: CatalogStore,
{
    pub fn new(store: S, config: ReconcileConfig) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ingest one document under `label`.
    ///
    /// A label that was already ingested short-circuits to `already_exists`
    /// before the document is even parsed.
    #[instrument(skip(self, document, extractor), fields(bytes = document.len()), err)]
    pub async fn reconcile_document<E>(
        &self,
        label: &str,
        document: &[u8],
        extractor: &E,
    ) -> ReconcileResult<ReconciliationReport>
    where
        E: LineItemExtractor + ?Sized,
    {
        let label = batch_label(label)?;
        if let Some(existing) = self.store.find_batch_by_label(&label).await? {
            info!(batch_id = %existing.id, "document already ingested");
            return Ok(ReconciliationReport::already_exists(existing.id));
        }
        let extracted = extractor.extract_line_items(document)?;
        self.run(&label, extracted.items, extracted.rejected).await
    }

    /// Same as [`Self::reconcile_document`] for line items that were already extracted.
    #[instrument(skip(self, items), fields(items = items.len()), err)]
    pub async fn reconcile_lines(
        &self,
        label: &str,
        items: Vec<RawLineItem>,
    ) -> ReconcileResult<ReconciliationReport> {
        let label = batch_label(label)?;
        if let Some(existing) = self.store.find_batch_by_label(&label).await? {
            info!(batch_id = %existing.id, "document already ingested");
            return Ok(ReconciliationReport::already_exists(existing.id));
        }
        self.run(&label, items, Vec::new()).await
    }

    async fn run(
        &self,
        label: &str,
        items: Vec<RawLineItem>,
        rejected: Vec<LineError>,
    ) -> ReconcileResult<ReconciliationReport> {
        let at = Utc::now();
        let aggregated = aggregate_lines(&items);
        let mut skipped = rejected;
        skipped.extend(aggregated.rejected);
        skipped.sort_by_key(|e| e.line);

        let ledger = BatchLedger::open(label, at)?;
        let mut index = CatalogIndex::build(self.store.list_all_products().await?);
        let ReconciliationPlan {
            batch,
            items,
            created,
            updated,
            history,
            report,
        } = ReconciliationEngine::new(&self.config).plan(
            &mut index,
            ledger,
            aggregated.lines,
            skipped,
            at,
        );

        self.store
            .commit(ChangeSet {
                batch: Some(batch),
                batch_items: items,
                created,
                updated,
                history,
                ..ChangeSet::default()
            })
            .await
            .map_err(|err| {
                error!(error = %err, retryable = err.is_retryable(), "reconciliation commit failed");
                ReconcileError::from(err)
            })?;

        info!(
            batch_id = %report.batch_id,
            listed = report.products.len(),
            hidden = report.hidden_count,
            skipped = report.skipped.len(),
            "document reconciled"
        );
        Ok(report)
    }

    /// Fold `discard` into `keep` and delete `discard`, atomically.
    #[instrument(skip(self), fields(keep = %keep, discard = %discard), err)]
    pub async fn merge_products(&self, keep: ProductId, discard: ProductId) -> ReconcileResult<Product> {
        let survivor = self.require_product(keep).await?;
        let absorbed = self.require_product(discard).await?;
        let plan = plan_merge(&survivor, &absorbed)?;

        self.store
            .commit(ChangeSet {
                reassignments: vec![Reassignment {
                    from: plan.discard,
                    to: keep,
                }],
                deleted: vec![plan.discard],
                updated: vec![plan.keep.clone()],
                ..ChangeSet::default()
            })
            .await?;
        info!(stock = plan.keep.stock, "products merged");
        Ok(plan.keep)
    }

    /// Apply selling-price edits larger than the selling-price threshold.
    ///
    /// Unknown products and invalid prices are skipped, not fatal.
    #[instrument(skip(self, updates), fields(requested = updates.len()), err)]
    pub async fn update_selling_prices(
        &self,
        updates: Vec<PriceUpdate>,
    ) -> ReconcileResult<PriceUpdateOutcome> {
        let at = Utc::now();
        let mut outcome = PriceUpdateOutcome::default();
        let mut touched: HashMap<ProductId, Product> = HashMap::new();
        let mut order = Vec::new();
        let mut history = Vec::new();

        for update in updates {
            if !touched.contains_key(&update.product_id) {
                match self.store.get_product(update.product_id).await? {
                    Some(product) => {
                        touched.insert(update.product_id, product);
                    }
                    None => {
                        outcome.skipped.push(PriceUpdateSkip {
                            product_id: update.product_id,
                            reason: "product not found".to_string(),
                        });
                        continue;
                    }
                }
            }
            let Some(product) = touched.get_mut(&update.product_id) else {
                continue;
            };
            match product.reprice_selling(
                update.selling_price,
                self.config.selling_price_change_threshold,
                at,
            ) {
                Ok(Some(entry)) => {
                    if !order.contains(&update.product_id) {
                        order.push(update.product_id);
                    }
                    history.push(entry);
                }
                Ok(None) => {}
                Err(err) => outcome.skipped.push(PriceUpdateSkip {
                    product_id: update.product_id,
                    reason: err.to_string(),
                }),
            }
        }

        outcome.updated = order.len();
        let updated = order
            .iter()
            .filter_map(|id| touched.remove(id))
            .collect();
        self.store
            .commit(ChangeSet {
                updated,
                history,
                ..ChangeSet::default()
            })
            .await?;
        info!(updated = outcome.updated, skipped = outcome.skipped.len(), "selling prices updated");
        Ok(outcome)
    }

    /// Set or clear a product's SKU/UPC.
    ///
    /// A code held by another product is rejected for that field only; the
    /// other field is still applied.
    #[instrument(skip(self, update), fields(product = %id), err)]
    pub async fn update_codes(&self, id: ProductId, update: CodeUpdate) -> ReconcileResult<CodeUpdateOutcome> {
        let catalog = self.store.list_all_products().await?;
        let mut product = catalog
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| ReconcileError::NotFound(format!("product {id}")))?;
        let original = product.clone();
        let mut rejected = Vec::new();

        for (field, requested) in [(CodeField::Sku, update.sku), (CodeField::Upc, update.upc)] {
            let Some(requested) = requested else { continue };
            let code = clean_code(Some(&requested));
            if let Some(code) = &code {
                if let Some(held_by) = code_holder(&catalog, field, code, id) {
                    warn!(field = %field, code = %code, held_by = %held_by, "code update rejected");
                    rejected.push(DuplicateCodeError {
                        field,
                        code: code.clone(),
                        product_id: id,
                        held_by,
                    });
                    continue;
                }
            }
            match field {
                CodeField::Sku => product.sku = code,
                CodeField::Upc => product.upc = code,
            }
        }

        if product != original {
            self.store.update_product(product.clone()).await?;
        }
        Ok(CodeUpdateOutcome { product, rejected })
    }

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    pub async fn create_manual_product(&self, request: ManualProduct) -> ReconcileResult<Product> {
        let catalog = self.store.list_all_products().await?;
        let index = CatalogIndex::build(catalog.clone());

        let name_key = normalize_name(&request.name);
        if let Some(existing) = index.by_name(&name_key) {
            return Err(ReconcileError::Duplicate(format!(
                "a product named '{}' already exists ({})",
                existing.name, existing.id
            )));
        }

        let id = ProductId::new();
        let sku = match clean_code(request.sku.as_deref()) {
            Some(sku) => Some(sku),
            None => self
                .config
                .sku_policy
                .sku_for(&request.name)
                .filter(|sku| code_holder(&catalog, CodeField::Sku, sku, id).is_none()),
        };
        for (field, code) in [(CodeField::Sku, &sku), (CodeField::Upc, &request.upc)] {
            let Some(code) = clean_code(code.as_deref()) else { continue };
            if let Some(held_by) = code_holder(&catalog, field, &code, id) {
                return Err(DuplicateCodeError {
                    field,
                    code,
                    product_id: id,
                    held_by,
                }
                .into());
            }
        }

        let product = Product::create_with_id(
            id,
            NewProduct {
                sku,
                upc: request.upc,
                name: request.name,
                description: request.description,
                cost: request.cost,
                selling_price: request.selling_price,
                stock: request.stock,
            },
        )?;

        let at = Utc::now();
        let mut history = Vec::new();
        if product.cost > 0.0 {
            history.push(PriceHistory::opening(id, PriceChangeKind::Cost, product.cost, at));
        }
        if product.selling_price > 0.0 {
            history.push(PriceHistory::opening(
                id,
                PriceChangeKind::SellingPrice,
                product.selling_price,
                at,
            ));
        }

        self.store
            .commit(ChangeSet {
                created: vec![product.clone()],
                history,
                ..ChangeSet::default()
            })
            .await?;
        info!(product = %product.id, "manual product created");
        Ok(product)
    }

    /// Whole catalog ordered by name.
    pub async fn list_products(&self) -> ReconcileResult<Vec<Product>> {
        let mut products = self.store.list_all_products().await?;
        products.sort_by_cached_key(|p| (normalize_name(&p.name), p.id));
        Ok(products)
    }

    pub async fn get_product(&self, id: ProductId) -> ReconcileResult<Product> {
        self.require_product(id).await
    }

    /// Price history of one product, newest first.
    pub async fn product_history(&self, id: ProductId) -> ReconcileResult<Vec<PriceHistory>> {
        self.require_product(id).await?;
        Ok(self.store.list_history(id).await?)
    }

    pub async fn list_batches(&self) -> ReconcileResult<Vec<BatchSummary>> {
        Ok(self.store.list_batches().await?)
    }

    pub async fn batch_details(&self, id: BatchId) -> ReconcileResult<BatchDetails> {
        let batch = self.require_batch(id).await?;
        let items = self.store.list_items_for_batch(id).await?;
        let products = self.store.list_all_products().await?;
        Ok(BatchDetails::assemble(batch, items, &products))
    }

    /// The only mutation a batch supports. Labels stay unique.
    #[instrument(skip(self), fields(batch_id = %id), err)]
    pub async fn rename_batch(&self, id: BatchId, label: &str) -> ReconcileResult<ImportBatch> {
        let mut batch = self.require_batch(id).await?;
        batch.rename(label)?;
        if let Some(other) = self.store.find_batch_by_label(&batch.label).await? {
            if other.id == id {
                return Ok(other);
            }
            return Err(ReconcileError::Duplicate(format!(
                "batch label '{}' is already used by batch {}",
                batch.label, other.id
            )));
        }
        Ok(self.store.rename_batch(id, &batch.label).await?)
    }

    async fn require_product(&self, id: ProductId) -> ReconcileResult<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(format!("product {id}")))
    }

    async fn require_batch(&self, id: BatchId) -> ReconcileResult<ImportBatch> {
        self.store
            .get_batch(id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(format!("batch {id}")))
    }
}

fn batch_label(label: &str) -> ReconcileResult<String> {
    let label = label.trim();
    if label.is_empty() {
        return Err(ReconcileError::Validation("batch label cannot be empty".to_string()));
    }
    Ok(label.to_string())
}

/// Product other than `except` whose code normalizes to the same key.
fn code_holder(catalog: &[Product], field: CodeField, code: &str, except: ProductId) -> Option<ProductId> {
    let key = normalize_code(Some(code));
    if key.is_empty() {
        return None;
    }
    catalog
        .iter()
        .filter(|p| p.id != except)
        .find(|p| {
            let held = match field {
                CodeField::Sku => p.sku(),
                CodeField::Upc => p.upc(),
            };
            normalize_code(held) == key
        })
        .map(|p| p.id)
}
