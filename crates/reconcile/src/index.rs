//! In-memory lookup structures over one catalog snapshot.
//!
//! Built once per run; products created during the run are linked in with
//! [`CatalogIndex::insert`] so later lines of the same document can match them.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use restock_catalog::Product;
use restock_core::ProductId;

use crate::normalize::{normalize_code, normalize_name};

/// Two distinct products whose names normalize to the same key.
///
/// The later product wins the name slot; the collision is kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameCollision {
    pub key: String,
    pub replaced: ProductId,
    pub winner: ProductId,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    products: Vec<Product>,
    by_sku: HashMap<String, usize>,
    by_upc: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    /// Distinct name keys in first-seen order (fuzzy candidates).
    name_keys: Vec<String>,
    collisions: Vec<NameCollision>,
}

impl CatalogIndex {
    pub fn build(products: impl IntoIterator<Item = Product>) -> Self {
        let mut index = Self::default();
        for product in products {
            index.insert(product);
        }
        index
    }

    /// Link a product into every map. Returns its position.
    pub fn insert(&mut self, product: Product) -> usize {
        let pos = self.products.len();
        let name_key = normalize_name(&product.name);
        self.products.push(product);
        self.link_codes(pos);

        if !name_key.is_empty() {
            match self.by_name.insert(name_key.clone(), pos) {
                Some(previous) => {
                    let collision = NameCollision {
                        key: name_key,
                        replaced: self.products[previous].id,
                        winner: self.products[pos].id,
                    };
                    warn!(
                        key = %collision.key,
                        replaced = %collision.replaced,
                        winner = %collision.winner,
                        "catalog name collision, last product wins"
                    );
                    self.collisions.push(collision);
                }
                None => self.name_keys.push(name_key),
            }
        }
        pos
    }

    /// (Re)register the SKU/UPC of the product at `pos`, e.g. after a backfill.
    pub(crate) fn link_codes(&mut self, pos: usize) {
        let product = &self.products[pos];
        let sku = normalize_code(product.sku());
        let upc = normalize_code(product.upc());
        if !sku.is_empty() {
            self.by_sku.insert(sku, pos);
        }
        if !upc.is_empty() {
            self.by_upc.insert(upc, pos);
        }
    }

    pub(crate) fn position_by_sku(&self, key: &str) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        self.by_sku.get(key).copied()
    }

    pub(crate) fn position_by_upc(&self, key: &str) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        self.by_upc.get(key).copied()
    }

    pub(crate) fn position_by_name(&self, key: &str) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        self.by_name.get(key).copied()
    }

    pub(crate) fn get(&self, pos: usize) -> &Product {
        &self.products[pos]
    }

    pub(crate) fn get_mut(&mut self, pos: usize) -> &mut Product {
        &mut self.products[pos]
    }

    /// Product holding a normalized SKU key.
    pub fn by_sku(&self, key: &str) -> Option<&Product> {
        self.position_by_sku(key).map(|pos| &self.products[pos])
    }

    pub fn by_upc(&self, key: &str) -> Option<&Product> {
        self.position_by_upc(key).map(|pos| &self.products[pos])
    }

    pub fn by_name(&self, key: &str) -> Option<&Product> {
        self.position_by_name(key).map(|pos| &self.products[pos])
    }

    pub fn name_keys(&self) -> &[String] {
        &self.name_keys
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn name_collisions(&self) -> &[NameCollision] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restock_catalog::NewProduct;

    fn product(name: &str, sku: Option<&str>, upc: Option<&str>) -> Product {
        Product::create(NewProduct {
            name: name.to_string(),
            sku: sku.map(str::to_string),
            upc: upc.map(str::to_string),
            ..NewProduct::default()
        })
        .unwrap()
    }

    #[test]
    fn lookups_use_normalized_keys() {
        let index = CatalogIndex::build(vec![
            product("Martillo de Acero", Some("mt-01"), Some("7501 0001")),
            product("Tornillo", None, None),
        ]);

        assert_eq!(index.by_sku("MT01").unwrap().name, "Martillo de Acero");
        assert_eq!(index.by_upc("75010001").unwrap().name, "Martillo de Acero");
        assert_eq!(index.by_name("tornillo").unwrap().name, "Tornillo");
        assert_eq!(index.name_keys(), &["martillo de acero", "tornillo"]);
    }

    #[test]
    fn empty_keys_never_match() {
        let index = CatalogIndex::build(vec![product("A", None, None), product("B", None, None)]);
        assert!(index.by_sku("").is_none());
        assert!(index.by_upc("").is_none());
        assert!(index.by_name("").is_none());
    }

    #[test]
    fn name_collisions_resolve_last_write_wins() {
        let first = product("Cinta Métrica", None, None);
        let second = product("cinta metrica", Some("CM-2"), None);
        let (first_id, second_id) = (first.id, second.id);
        let index = CatalogIndex::build(vec![first, second]);

        assert_eq!(index.by_name("cinta metrica").unwrap().id, second_id);
        assert_eq!(index.name_keys().len(), 1);
        assert_eq!(
            index.name_collisions(),
            &[NameCollision {
                key: "cinta metrica".to_string(),
                replaced: first_id,
                winner: second_id,
            }]
        );
    }

    #[test]
    fn inserted_products_are_immediately_visible() {
        let mut index = CatalogIndex::build(Vec::new());
        assert!(index.is_empty());
        let pos = index.insert(product("Widget Azul", Some("W-1"), None));
        assert_eq!(index.position_by_sku("W1"), Some(pos));
        assert_eq!(index.position_by_name("widget azul"), Some(pos));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn backfilled_codes_can_be_relinked() {
        let mut index = CatalogIndex::build(vec![product("Widget", None, None)]);
        index.get_mut(0).sku = Some("W-9".to_string());
        assert!(index.by_sku("W9").is_none());
        index.link_codes(0);
        assert_eq!(index.by_sku("W9").unwrap().name, "Widget");
    }
}
