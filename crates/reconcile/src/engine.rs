//! The reconciliation planner.
//!
//! Turns the aggregated lines of one document into the full set of catalog
//! mutations plus the per-line report. It never touches storage: the caller
//! commits [`ReconciliationPlan`] in one transaction or not at all.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use restock_catalog::{ImportBatch, ImportBatchItem, NewProduct, PriceChangeKind, PriceHistory, Product};
use restock_core::{BatchId, ProductId};

use crate::aggregate::AggregatedLine;
use crate::config::ReconcileConfig;
use crate::error::{CodeField, DuplicateCodeError, LineError, LineErrorKind};
use crate::index::CatalogIndex;
use crate::ledger::BatchLedger;
use crate::normalize::normalize_code;
use crate::resolver::{IdentityResolver, MatchRule, Suggestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// A batch with the same label exists; nothing was processed.
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Ok,
    PriceChanged,
    New,
    /// Routine restock of a priced product; counted but not listed.
    Hidden,
}

/// Per-line result record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineOutcome {
    pub id: ProductId,
    pub name: String,
    pub quantity: f64,
    pub cost: f64,
    pub cost_with_tax: f64,
    /// Cost held before this run, for matched lines.
    pub old_cost: Option<f64>,
    pub selling_price: f64,
    pub sku: Option<String>,
    pub upc: Option<String>,
    pub status: LineStatus,
    pub matched_by: Option<MatchRule>,
    pub suggestions: Vec<Suggestion>,
}

/// Something the run chose not to do, without failing the line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum LineWarning {
    DuplicateCode {
        line: usize,
        #[serde(flatten)]
        error: DuplicateCodeError,
    },
    SyntheticSkuTaken {
        line: usize,
        sku: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub status: RunStatus,
    pub batch_id: BatchId,
    pub products: Vec<LineOutcome>,
    pub hidden_count: usize,
    pub skipped: Vec<LineError>,
    pub warnings: Vec<LineWarning>,
}

impl ReconciliationReport {
    /// Short-circuit result for a document that was already ingested.
    pub fn already_exists(batch_id: BatchId) -> Self {
        Self {
            status: RunStatus::AlreadyExists,
            batch_id,
            products: Vec::new(),
            hidden_count: 0,
            skipped: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Every mutation of one run, in final state.
#[derive(Debug, Clone)]
pub struct ReconciliationPlan {
    pub batch: ImportBatch,
    pub items: Vec<ImportBatchItem>,
    /// Products created by this run (including any later lines that hit them).
    pub created: Vec<Product>,
    /// Pre-existing products touched by this run.
    pub updated: Vec<Product>,
    pub history: Vec<PriceHistory>,
    pub report: ReconciliationReport,
}

pub struct ReconciliationEngine<'c> {
    config: &'c ReconcileConfig,
    resolver: IdentityResolver<'c>,
}

impl<'c> ReconciliationEngine<'c> {
    pub fn new(config: &'c ReconcileConfig) -> Self {
        Self {
            config,
            resolver: IdentityResolver::new(config),
        }
    }

    /// Resolve every line against `index` in document order.
    ///
    /// The index is updated in place, so a line may match a product created by
    /// an earlier line of the same document. `skipped` carries lines already
    /// rejected upstream and ends up in the report.
    #[instrument(skip_all, fields(batch = %ledger.batch().label, lines = lines.len()))]
    pub fn plan(
        &self,
        index: &mut CatalogIndex,
        mut ledger: BatchLedger,
        lines: Vec<AggregatedLine>,
        mut skipped: Vec<LineError>,
        at: DateTime<Utc>,
    ) -> ReconciliationPlan {
        let original_len = index.len();
        let mut touched: BTreeSet<usize> = BTreeSet::new();
        let mut history = Vec::new();
        let mut warnings = Vec::new();
        let mut outcomes = Vec::with_capacity(lines.len());

        for line in lines {
            match self.resolver.find_match(index, &line) {
                Some(found) => {
                    let product = index.get_mut(found.position);
                    let old_cost = product.cost;
                    product.receive_stock(line.quantity);
                    let change =
                        product.reprice_cost(line.unit_cost, self.config.cost_change_threshold, at);
                    let status = if change.is_some() {
                        LineStatus::PriceChanged
                    } else if product.has_selling_price() {
                        LineStatus::Hidden
                    } else {
                        LineStatus::Ok
                    };
                    history.extend(change);

                    backfill_codes(index, found.position, &line, &mut warnings);
                    if found.position < original_len {
                        touched.insert(found.position);
                    }
                    ledger.record(found.product_id, line.quantity);

                    debug!(
                        line = line.first_line(),
                        product = %found.product_id,
                        rule = ?found.rule,
                        status = ?status,
                        "line matched"
                    );
                    outcomes.push(outcome(
                        index.get(found.position),
                        &line,
                        status,
                        Some(old_cost),
                        Some(found.rule),
                        Vec::new(),
                    ));
                }
                None => {
                    let suggestions = self.resolver.suggest(index, &line);
                    let sku = self.sku_for_new(index, &line, &mut warnings);
                    let product = match Product::create(NewProduct {
                        sku,
                        upc: line.upc.clone(),
                        name: line.name.clone(),
                        cost: line.unit_cost,
                        stock: line.quantity,
                        ..NewProduct::default()
                    }) {
                        Ok(product) => product,
                        Err(err) => {
                            warn!(line = line.first_line(), error = %err, "line rejected");
                            skipped.push(LineError::new(
                                line.first_line(),
                                LineErrorKind::Rejected {
                                    reason: err.to_string(),
                                },
                            ));
                            continue;
                        }
                    };
                    history.push(PriceHistory::opening(
                        product.id,
                        PriceChangeKind::Cost,
                        product.cost,
                        at,
                    ));
                    ledger.record(product.id, line.quantity);
                    let pos = index.insert(product);

                    debug!(
                        line = line.first_line(),
                        product = %index.get(pos).id,
                        suggestions = suggestions.len(),
                        "new product"
                    );
                    outcomes.push(outcome(
                        index.get(pos),
                        &line,
                        LineStatus::New,
                        None,
                        None,
                        suggestions,
                    ));
                }
            }
        }

        let hidden_count = outcomes
            .iter()
            .filter(|o| o.status == LineStatus::Hidden)
            .count();
        outcomes.retain(|o| o.status != LineStatus::Hidden);
        outcomes.sort_by_key(|o| self.rank(o));

        let created = index.products()[original_len..].to_vec();
        let updated = touched.iter().map(|&pos| index.get(pos).clone()).collect();
        let (batch, items) = ledger.close();

        info!(
            batch_id = %batch.id,
            created = created.len(),
            updated = touched.len(),
            history = history.len(),
            hidden = hidden_count,
            skipped = skipped.len(),
            warnings = warnings.len(),
            "reconciliation planned"
        );

        ReconciliationPlan {
            report: ReconciliationReport {
                status: RunStatus::Success,
                batch_id: batch.id,
                products: outcomes,
                hidden_count,
                skipped,
                warnings,
            },
            batch,
            items,
            created,
            updated,
            history,
        }
    }

    /// SKU for a brand-new product: the line code, else an embedded code, else
    /// whatever the SKU policy says (skipped if it is already taken).
    fn sku_for_new(
        &self,
        index: &CatalogIndex,
        line: &AggregatedLine,
        warnings: &mut Vec<LineWarning>,
    ) -> Option<String> {
        if line.code.is_some() {
            return line.code.clone();
        }
        if let Some(code) = line.embedded_codes.iter().next() {
            return Some(code.clone());
        }
        let sku = self.config.sku_policy.sku_for(&line.name)?;
        if index.position_by_sku(&normalize_code(Some(&sku))).is_some() {
            warn!(line = line.first_line(), sku = %sku, "synthetic sku already taken");
            warnings.push(LineWarning::SyntheticSkuTaken {
                line: line.first_line(),
                sku,
            });
            return None;
        }
        Some(sku)
    }

    fn rank(&self, outcome: &LineOutcome) -> u8 {
        match outcome.status {
            LineStatus::PriceChanged => 0,
            LineStatus::New if self.config.prioritize_suggested_new => {
                if outcome.suggestions.is_empty() { 2 } else { 1 }
            }
            LineStatus::New => 2,
            LineStatus::Ok | LineStatus::Hidden => 3,
        }
    }
}

/// Fill a matched product's empty SKU/UPC from the line, unless another
/// product already holds that code.
fn backfill_codes(
    index: &mut CatalogIndex,
    pos: usize,
    line: &AggregatedLine,
    warnings: &mut Vec<LineWarning>,
) {
    let mut linked = false;
    let product = index.get(pos);

    // A code equal to the product's own barcode is not a SKU.
    let sku_candidate = line
        .code
        .as_deref()
        .filter(|_| product.sku.is_none() && line.code_key != normalize_code(product.upc()));
    if let Some(code) = sku_candidate {
        match index.position_by_sku(&line.code_key) {
            Some(holder) if holder != pos => {
                warnings.push(duplicate(index, pos, holder, line, CodeField::Sku, code));
            }
            _ => linked |= index.get_mut(pos).backfill_sku(code),
        }
    }

    let product = index.get(pos);
    if let Some(upc) = line.upc.as_deref().filter(|_| product.upc.is_none()) {
        match index.position_by_upc(&line.upc_key) {
            Some(holder) if holder != pos => {
                warnings.push(duplicate(index, pos, holder, line, CodeField::Upc, upc));
            }
            _ => linked |= index.get_mut(pos).backfill_upc(upc),
        }
    }

    if linked {
        index.link_codes(pos);
    }
}

fn duplicate(
    index: &CatalogIndex,
    pos: usize,
    holder: usize,
    line: &AggregatedLine,
    field: CodeField,
    code: &str,
) -> LineWarning {
    let error = DuplicateCodeError {
        field,
        code: code.to_string(),
        product_id: index.get(pos).id,
        held_by: index.get(holder).id,
    };
    warn!(line = line.first_line(), error = %error, "code backfill skipped");
    LineWarning::DuplicateCode {
        line: line.first_line(),
        error,
    }
}

fn outcome(
    product: &Product,
    line: &AggregatedLine,
    status: LineStatus,
    old_cost: Option<f64>,
    matched_by: Option<MatchRule>,
    suggestions: Vec<Suggestion>,
) -> LineOutcome {
    LineOutcome {
        id: product.id,
        name: product.name.clone(),
        quantity: line.quantity,
        cost: line.unit_cost,
        cost_with_tax: line.unit_cost_with_tax,
        old_cost,
        selling_price: product.selling_price,
        sku: product.sku.clone(),
        upc: product.upc.clone(),
        status,
        matched_by,
        suggestions,
    }
}
