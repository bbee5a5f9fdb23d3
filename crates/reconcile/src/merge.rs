//! Folding one product into another.

use serde::Serialize;

use restock_catalog::{ImportBatchItem, Product};
use restock_core::{DomainError, DomainResult, ProductId};

/// Result of merging `discard` into `keep`.
///
/// The store applies it atomically: history and batch items referencing
/// `discard` move to `keep.id`, `keep` is updated, `discard` is deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergePlan {
    pub keep: Product,
    pub discard: ProductId,
}

pub fn plan_merge(keep: &Product, discard: &Product) -> DomainResult<MergePlan> {
    if keep.id == discard.id {
        return Err(DomainError::validation("cannot merge a product into itself"));
    }
    let mut merged = keep.clone();
    merged.absorb(discard);
    Ok(MergePlan {
        keep: merged,
        discard: discard.id,
    })
}

/// Repoint items from `from` to `to`, folding items that end up sharing a batch.
///
/// Keeps the one-item-per-product-per-batch rule intact after a merge. The
/// surviving item is the first one in input order.
pub fn fold_batch_items(
    items: Vec<ImportBatchItem>,
    from: ProductId,
    to: ProductId,
) -> Vec<ImportBatchItem> {
    let mut out: Vec<ImportBatchItem> = Vec::with_capacity(items.len());
    for mut item in items {
        if item.product_id == from {
            item.product_id = to;
        }
        if item.product_id == to {
            if let Some(existing) = out
                .iter_mut()
                .find(|o| o.batch_id == item.batch_id && o.product_id == to)
            {
                existing.quantity += item.quantity;
                continue;
            }
        }
        out.push(item);
    }
    out
}
