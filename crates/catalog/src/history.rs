use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use restock_core::{DomainError, Entity, PriceHistoryId, ProductId};

/// What kind of price moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceChangeKind {
    /// Unit cost as seen on a supplier document.
    Cost,
    /// Shelf price set by hand.
    SellingPrice,
}

impl PriceChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceChangeKind::Cost => "COST",
            PriceChangeKind::SellingPrice => "SELLING_PRICE",
        }
    }
}

impl core::fmt::Display for PriceChangeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PriceChangeKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COST" => Ok(PriceChangeKind::Cost),
            "SELLING_PRICE" => Ok(PriceChangeKind::SellingPrice),
            other => Err(DomainError::validation(format!(
                "unknown price change kind '{other}'"
            ))),
        }
    }
}

/// Append-only audit record of one material price change.
///
/// Entries are never edited. They only disappear when their product is deleted,
/// and they follow their product when it is merged into another one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub id: PriceHistoryId,
    pub product_id: ProductId,
    pub kind: PriceChangeKind,
    pub old_value: f64,
    pub new_value: f64,
    pub recorded_at: DateTime<Utc>,
}

impl PriceHistory {
    pub fn record(
        product_id: ProductId,
        kind: PriceChangeKind,
        old_value: f64,
        new_value: f64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PriceHistoryId::new(),
            product_id,
            kind,
            old_value,
            new_value,
            recorded_at,
        }
    }

    /// The first entry of a freshly created product (old value is always 0).
    pub fn opening(
        product_id: ProductId,
        kind: PriceChangeKind,
        value: f64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self::record(product_id, kind, 0.0, value, recorded_at)
    }

    pub fn delta(&self) -> f64 {
        self.new_value - self.old_value
    }
}

impl Entity for PriceHistory {
    type Id = PriceHistoryId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_storage_string() {
        for kind in [PriceChangeKind::Cost, PriceChangeKind::SellingPrice] {
            assert_eq!(kind.as_str().parse::<PriceChangeKind>().unwrap(), kind);
        }
        assert!("PRICE".parse::<PriceChangeKind>().is_err());
    }

    #[test]
    fn opening_entry_starts_from_zero() {
        let entry = PriceHistory::opening(ProductId::new(), PriceChangeKind::Cost, 12.5, Utc::now());
        assert_eq!(entry.old_value, 0.0);
        assert_eq!(entry.new_value, 12.5);
        assert_eq!(entry.delta(), 12.5);
    }
}
