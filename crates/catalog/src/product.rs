use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use restock_core::{DomainError, DomainResult, Entity, ProductId};

use crate::history::{PriceChangeKind, PriceHistory};

/// Trim a raw product code.
///
/// Blank input and placeholders without any letter or digit (`"-"`, `"."`,
/// `"/"`) mean "no code": they would normalize to an empty key.
pub fn clean_code(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .map(str::to_string)
}

/// Catalog product (identity record).
///
/// `sku` and `upc` are optional but unique across the catalog when present;
/// uniqueness is enforced by the store, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: Option<String>,
    pub upc: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// Current unit cost (last seen on a supplier document).
    pub cost: f64,
    /// Current selling price; `0.0` means unset.
    pub selling_price: f64,
    pub stock: f64,
}

/// Fields for a product about to be created.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: Option<String>,
    pub upc: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub cost: f64,
    pub selling_price: f64,
    pub stock: f64,
}

impl Product {
    /// Validate and build a product with a fresh identifier.
    pub fn create(fields: NewProduct) -> DomainResult<Self> {
        Self::create_with_id(ProductId::new(), fields)
    }

    pub fn create_with_id(id: ProductId, fields: NewProduct) -> DomainResult<Self> {
        let name = fields.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        ensure_amount("cost", fields.cost)?;
        ensure_amount("selling_price", fields.selling_price)?;
        ensure_amount("stock", fields.stock)?;

        Ok(Self {
            id,
            sku: clean_code(fields.sku.as_deref()),
            upc: clean_code(fields.upc.as_deref()),
            name: name.to_string(),
            description: fields
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            cost: fields.cost,
            selling_price: fields.selling_price,
            stock: fields.stock,
        })
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn upc(&self) -> Option<&str> {
        self.upc.as_deref()
    }

    pub fn has_selling_price(&self) -> bool {
        self.selling_price > 0.0
    }

    pub fn receive_stock(&mut self, quantity: f64) {
        self.stock += quantity;
    }

    /// Overwrite the unit cost, returning a history entry when the move is
    /// larger than `threshold`.
    ///
    /// The comparison is always against the value held before the call.
    pub fn reprice_cost(
        &mut self,
        new_cost: f64,
        threshold: f64,
        at: DateTime<Utc>,
    ) -> Option<PriceHistory> {
        let old_cost = self.cost;
        self.cost = new_cost;
        ((old_cost - new_cost).abs() > threshold)
            .then(|| PriceHistory::record(self.id, PriceChangeKind::Cost, old_cost, new_cost, at))
    }

    /// Change the selling price when it moves by more than `threshold`.
    ///
    /// Sub-threshold edits are ignored entirely (price and history unchanged).
    pub fn reprice_selling(
        &mut self,
        new_price: f64,
        threshold: f64,
        at: DateTime<Utc>,
    ) -> DomainResult<Option<PriceHistory>> {
        ensure_amount("selling_price", new_price)?;
        let old_price = self.selling_price;
        if (old_price - new_price).abs() <= threshold {
            return Ok(None);
        }
        self.selling_price = new_price;
        Ok(Some(PriceHistory::record(
            self.id,
            PriceChangeKind::SellingPrice,
            old_price,
            new_price,
            at,
        )))
    }

    /// Fill an empty SKU. Never overwrites an existing one.
    pub fn backfill_sku(&mut self, sku: &str) -> bool {
        match (&self.sku, clean_code(Some(sku))) {
            (None, Some(code)) => {
                self.sku = Some(code);
                true
            }
            _ => false,
        }
    }

    /// Fill an empty UPC. Never overwrites an existing one.
    pub fn backfill_upc(&mut self, upc: &str) -> bool {
        match (&self.upc, clean_code(Some(upc))) {
            (None, Some(code)) => {
                self.upc = Some(code);
                true
            }
            _ => false,
        }
    }

    /// Fold another product's state into this one (the merge survivor).
    ///
    /// Stock adds up; cost and codes are adopted only where this product has none.
    pub fn absorb(&mut self, other: &Product) {
        self.stock += other.stock;
        if self.cost == 0.0 {
            self.cost = other.cost;
        }
        if self.sku.is_none() {
            self.sku = other.sku.clone();
        }
        if self.upc.is_none() {
            self.upc = other.upc.clone();
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

fn ensure_amount(field: &str, value: f64) -> DomainResult<()> {
    if !value.is_finite() {
        return Err(DomainError::validation(format!("{field} must be a finite number")));
    }
    if value < 0.0 {
        return Err(DomainError::validation(format!("{field} cannot be negative")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_codes_are_no_code() {
        assert_eq!(clean_code(Some("  X-1 ")), Some("X-1".to_string()));
        assert_eq!(clean_code(Some("   ")), None);
        for placeholder in ["-", " . ", "/", "--"] {
            assert_eq!(clean_code(Some(placeholder)), None, "{placeholder:?}");
        }
        let product = Product::create(NewProduct {
            name: "Alfa".to_string(),
            sku: Some("-".to_string()),
            upc: Some("/".to_string()),
            ..NewProduct::default()
        })
        .unwrap();
        assert_eq!(product.sku, None);
        assert_eq!(product.upc, None);
    }

    fn widget() -> Product {
        Product::create(NewProduct {
            name: "Widget Azul".to_string(),
            cost: 10.0,
            stock: 12.0,
            ..NewProduct::default()
        })
        .unwrap()
    }

    #[test]
    fn create_trims_name_and_blank_codes() {
        let p = Product::create(NewProduct {
            sku: Some("   ".to_string()),
            upc: Some(" 7501 ".to_string()),
            name: "  Tornillo  ".to_string(),
            ..NewProduct::default()
        })
        .unwrap();

        assert_eq!(p.name, "Tornillo");
        assert_eq!(p.sku(), None);
        assert_eq!(p.upc(), Some("7501"));
        assert!(!p.has_selling_price());
    }

    #[test]
    fn create_rejects_empty_name() {
        let err = Product::create(NewProduct {
            name: "   ".to_string(),
            ..NewProduct::default()
        })
        .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty name"),
        }
    }

    #[test]
    fn create_rejects_negative_and_non_finite_amounts() {
        for (cost, stock) in [(-1.0, 0.0), (f64::NAN, 0.0), (0.0, -3.0)] {
            let err = Product::create(NewProduct {
                name: "X".to_string(),
                cost,
                stock,
                ..NewProduct::default()
            })
            .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn small_cost_move_is_applied_without_history() {
        let mut p = widget();
        let entry = p.reprice_cost(10.05, 0.1, Utc::now());
        assert!(entry.is_none());
        assert_eq!(p.cost, 10.05);
    }

    #[test]
    fn material_cost_move_records_old_and_new() {
        let mut p = widget();
        let entry = p.reprice_cost(10.20, 0.1, Utc::now()).unwrap();
        assert_eq!(entry.kind, PriceChangeKind::Cost);
        assert_eq!(entry.old_value, 10.0);
        assert_eq!(entry.new_value, 10.20);
        assert_eq!(entry.product_id, p.id);
        assert_eq!(p.cost, 10.20);
    }

    #[test]
    fn selling_price_ignores_sub_threshold_edits() {
        let mut p = widget();
        p.selling_price = 15.0;
        assert!(p.reprice_selling(15.005, 0.01, Utc::now()).unwrap().is_none());
        assert_eq!(p.selling_price, 15.0);

        let entry = p.reprice_selling(16.0, 0.01, Utc::now()).unwrap().unwrap();
        assert_eq!(entry.kind, PriceChangeKind::SellingPrice);
        assert_eq!(entry.old_value, 15.0);
        assert_eq!(p.selling_price, 16.0);
    }

    #[test]
    fn selling_price_rejects_negative_values() {
        let mut p = widget();
        assert!(p.reprice_selling(-2.0, 0.01, Utc::now()).is_err());
    }

    #[test]
    fn backfill_never_overwrites_existing_codes() {
        let mut p = widget();
        assert!(p.backfill_sku("X1"));
        assert!(!p.backfill_sku("X2"));
        assert_eq!(p.sku(), Some("X1"));
        assert!(!p.backfill_upc("  "));
        assert_eq!(p.upc(), None);
    }

    #[test]
    fn absorb_keeps_nonzero_cost_and_adds_stock() {
        let mut keep = Product::create(NewProduct {
            name: "A".to_string(),
            cost: 7.0,
            stock: 5.0,
            ..NewProduct::default()
        })
        .unwrap();
        let discard = Product::create(NewProduct {
            name: "B".to_string(),
            sku: Some("B-1".to_string()),
            cost: 0.0,
            stock: 3.0,
            ..NewProduct::default()
        })
        .unwrap();

        keep.absorb(&discard);
        assert_eq!(keep.stock, 8.0);
        assert_eq!(keep.cost, 7.0);
        assert_eq!(keep.sku(), Some("B-1"));
    }

    #[test]
    fn absorb_adopts_cost_when_survivor_has_none() {
        let mut keep = widget();
        keep.cost = 0.0;
        let mut discard = widget();
        discard.cost = 4.5;
        keep.absorb(&discard);
        assert_eq!(keep.cost, 4.5);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: history is recorded exactly when the move exceeds the threshold,
            /// and the stored cost always ends at the new value.
            #[test]
            fn cost_history_matches_threshold(old in 0.0f64..1000.0, new in 0.0f64..1000.0) {
                let mut p = widget();
                p.cost = old;
                let entry = p.reprice_cost(new, 0.1, Utc::now());
                prop_assert_eq!(entry.is_some(), (old - new).abs() > 0.1);
                prop_assert_eq!(p.cost, new);
            }

            /// Property: stock accumulates additively.
            #[test]
            fn receive_stock_adds(start in 0u32..10_000, qty in 0u32..10_000) {
                let mut p = widget();
                p.stock = f64::from(start);
                p.receive_stock(f64::from(qty));
                prop_assert_eq!(p.stock, f64::from(start) + f64::from(qty));
            }
        }
    }
}
