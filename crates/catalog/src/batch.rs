use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use restock_core::{BatchId, BatchItemId, DomainError, DomainResult, Entity, ProductId};

/// One ingested document.
///
/// The label (usually the source filename) is unique across the ledger, which
/// is what makes re-imports detectable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: BatchId,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

impl ImportBatch {
    pub fn open(label: &str, created_at: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: BatchId::new(),
            label: validate_label(label)?,
            created_at,
        })
    }

    /// The only mutation a batch supports after creation.
    pub fn rename(&mut self, label: &str) -> DomainResult<()> {
        self.label = validate_label(label)?;
        Ok(())
    }
}

impl Entity for ImportBatch {
    type Id = BatchId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Link between a batch and one product it touched, with the quantity it contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatchItem {
    pub id: BatchItemId,
    pub batch_id: BatchId,
    pub product_id: ProductId,
    pub quantity: f64,
}

impl ImportBatchItem {
    pub fn new(batch_id: BatchId, product_id: ProductId, quantity: f64) -> Self {
        Self {
            id: BatchItemId::new(),
            batch_id,
            product_id,
            quantity,
        }
    }
}

impl Entity for ImportBatchItem {
    type Id = BatchItemId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

fn validate_label(label: &str) -> DomainResult<String> {
    let label = label.trim();
    if label.is_empty() {
        return Err(DomainError::validation("batch label cannot be empty"));
    }
    Ok(label.to_string())
}
