//! Identity resolution: which catalog product (if any) an aggregated line is.
//!
//! Precedence, first hit wins:
//!
//! 1. normalized SKU
//! 2. normalized UPC (the line's barcode, else its code)
//! 3. an embedded numeric code from the line's name, against the SKU map
//! 4. exact normalized name
//! 5. approximate name, only at or above `match_threshold`
//!
//! Suggestions for unmatched lines are computed separately and never applied.

use std::collections::HashSet;

use serde::Serialize;

use restock_core::ProductId;

use crate::aggregate::AggregatedLine;
use crate::config::ReconcileConfig;
use crate::index::CatalogIndex;
use crate::normalize::normalize_code;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Sku,
    Upc,
    EmbeddedCode,
    Name,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub product_id: ProductId,
    pub rule: MatchRule,
    /// 1.0 for exact rules, the similarity for fuzzy ones.
    pub score: f64,
    #[serde(skip)]
    pub(crate) position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SuggestionReason {
    /// The product's SKU, UPC or name contains this code from the line's name.
    EmbeddedCode { code: String },
    SimilarName,
}

/// Advisory candidate for a line that did not match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub product_id: ProductId,
    pub name: String,
    pub sku: Option<String>,
    pub upc: Option<String>,
    pub score: f64,
    #[serde(flatten)]
    pub reason: SuggestionReason,
}

#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver<'c> {
    config: &'c ReconcileConfig,
}

impl<'c> IdentityResolver<'c> {
    pub fn new(config: &'c ReconcileConfig) -> Self {
        Self { config }
    }

    pub fn find_match(&self, index: &CatalogIndex, line: &AggregatedLine) -> Option<Match> {
        let exact = |position: usize, rule: MatchRule| Match {
            product_id: index.get(position).id,
            rule,
            score: 1.0,
            position,
        };

        if let Some(pos) = index.position_by_sku(&line.code_key) {
            return Some(exact(pos, MatchRule::Sku));
        }

        let upc_key = if line.upc_key.is_empty() {
            &line.code_key
        } else {
            &line.upc_key
        };
        if let Some(pos) = index.position_by_upc(upc_key) {
            return Some(exact(pos, MatchRule::Upc));
        }

        // BTreeSet iteration keeps this deterministic when several codes hit.
        for code in &line.embedded_codes {
            if let Some(pos) = index.position_by_sku(&normalize_code(Some(code))) {
                return Some(exact(pos, MatchRule::EmbeddedCode));
            }
        }

        if let Some(pos) = index.position_by_name(&line.name_key) {
            return Some(exact(pos, MatchRule::Name));
        }

        self.best_fuzzy(index, &line.name_key)
            .filter(|(score, _)| *score >= self.config.match_threshold)
            .map(|(score, position)| Match {
                product_id: index.get(position).id,
                rule: MatchRule::Fuzzy,
                score,
                position,
            })
    }

    /// Candidates for an unmatched line, capped at `max_suggestions`.
    ///
    /// Embedded-code hits come first (catalog order), then similar names by
    /// descending score. Each product appears at most once.
    pub fn suggest(&self, index: &CatalogIndex, line: &AggregatedLine) -> Vec<Suggestion> {
        let cap = self.config.max_suggestions;
        let mut seen: HashSet<ProductId> = HashSet::new();
        let mut out = Vec::new();

        if !line.embedded_codes.is_empty() {
            for product in index.products() {
                if out.len() >= cap {
                    return out;
                }
                let sku = normalize_code(product.sku());
                let upc = normalize_code(product.upc());
                let hit = line.embedded_codes.iter().find(|code| {
                    sku.contains(code.as_str())
                        || upc.contains(code.as_str())
                        || product.name.contains(code.as_str())
                });
                if let Some(code) = hit {
                    if seen.insert(product.id) {
                        out.push(Suggestion {
                            product_id: product.id,
                            name: product.name.clone(),
                            sku: product.sku.clone(),
                            upc: product.upc.clone(),
                            score: 1.0,
                            reason: SuggestionReason::EmbeddedCode { code: code.clone() },
                        });
                    }
                }
            }
        }

        for (score, position) in self.ranked_names(index, &line.name_key) {
            if out.len() >= cap {
                break;
            }
            let product = index.get(position);
            if seen.insert(product.id) {
                out.push(Suggestion {
                    product_id: product.id,
                    name: product.name.clone(),
                    sku: product.sku.clone(),
                    upc: product.upc.clone(),
                    score,
                    reason: SuggestionReason::SimilarName,
                });
            }
        }

        out
    }

    /// Highest-scoring catalog name; ties go to the earlier key.
    fn best_fuzzy(&self, index: &CatalogIndex, name_key: &str) -> Option<(f64, usize)> {
        if name_key.is_empty() {
            return None;
        }
        let mut best: Option<(f64, &str)> = None;
        for key in index.name_keys() {
            let score = self.config.similarity.score(name_key, key);
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, key));
            }
        }
        best.and_then(|(score, key)| index.position_by_name(key).map(|pos| (score, pos)))
    }

    /// Catalog names scoring at or above `suggestion_threshold`, best first.
    fn ranked_names(&self, index: &CatalogIndex, name_key: &str) -> Vec<(f64, usize)> {
        if name_key.is_empty() {
            return Vec::new();
        }
        let mut ranked: Vec<(f64, usize)> = index
            .name_keys()
            .iter()
            .filter_map(|key| {
                let score = self.config.similarity.score(name_key, key);
                (score >= self.config.suggestion_threshold)
                    .then(|| index.position_by_name(key).map(|pos| (score, pos)))
                    .flatten()
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_lines;
    use crate::line::RawLineItem;
    use restock_catalog::{NewProduct, Product};

    fn product(name: &str, sku: Option<&str>, upc: Option<&str>) -> Product {
        Product::create(NewProduct {
            name: name.to_string(),
            sku: sku.map(str::to_string),
            upc: upc.map(str::to_string),
            cost: 10.0,
            ..NewProduct::default()
        })
        .unwrap()
    }

    fn line(code: Option<&str>, name: &str) -> AggregatedLine {
        aggregate_lines(&[RawLineItem::new(1, code, name, 1.0, 1.0, 1.0)])
            .lines
            .remove(0)
    }

    fn catalog() -> CatalogIndex {
        CatalogIndex::build(vec![
            product("Martillo de Acero", Some("MT-01"), Some("7501000111")),
            product("Pintura Vinilica Blanca", Some("45012"), None),
            product("Tornillo Hexagonal", Some("TH-9"), None),
            product("Widget Azul", None, None),
        ])
    }

    #[test]
    fn sku_match_wins_over_a_better_name_match() {
        let index = catalog();
        let resolver_config = ReconcileConfig::default();
        let resolver = IdentityResolver::new(&resolver_config);

        let m = resolver
            .find_match(&index, &line(Some("mt01"), "Widget Azul"))
            .unwrap();
        assert_eq!(m.rule, MatchRule::Sku);
        assert_eq!(m.product_id, index.products()[0].id);
    }

    #[test]
    fn code_can_match_a_barcode() {
        let index = catalog();
        let config = ReconcileConfig::default();
        let m = IdentityResolver::new(&config)
            .find_match(&index, &line(Some("7501000111"), "Algo distinto"))
            .unwrap();
        assert_eq!(m.rule, MatchRule::Upc);
    }

    #[test]
    fn explicit_upc_is_preferred_over_code_for_barcode_lookup() {
        let index = catalog();
        let config = ReconcileConfig::default();
        let raw = RawLineItem::new(1, Some("ZZ-404"), "Algo", 1.0, 1.0, 1.0).with_upc("7501000111");
        let l = aggregate_lines(&[raw]).lines.remove(0);
        let m = IdentityResolver::new(&config).find_match(&index, &l).unwrap();
        assert_eq!(m.rule, MatchRule::Upc);
        assert_eq!(m.product_id, index.products()[0].id);
    }

    #[test]
    fn embedded_code_matches_sku() {
        let index = catalog();
        let config = ReconcileConfig::default();
        let m = IdentityResolver::new(&config)
            .find_match(&index, &line(None, "PINTURA 19L 45012"))
            .unwrap();
        assert_eq!(m.rule, MatchRule::EmbeddedCode);
        assert_eq!(m.product_id, index.products()[1].id);
    }

    #[test]
    fn exact_name_ignores_case_and_accents() {
        let index = catalog();
        let config = ReconcileConfig::default();
        let m = IdentityResolver::new(&config)
            .find_match(&index, &line(Some("NEW-1"), "WIDGET AZÚL"))
            .unwrap();
        assert_eq!(m.rule, MatchRule::Name);
    }

    #[test]
    fn fuzzy_match_requires_high_confidence() {
        let index = catalog();
        let config = ReconcileConfig::default();
        let resolver = IdentityResolver::new(&config);

        // one edit over 18 chars: 0.944
        let m = resolver
            .find_match(&index, &line(None, "Martillo de Aceros"))
            .unwrap();
        assert_eq!(m.rule, MatchRule::Fuzzy);
        assert!(m.score >= 0.85);

        assert!(resolver.find_match(&index, &line(None, "Martillo Bola")).is_none());
    }

    #[test]
    fn codeless_nameless_style_lines_do_not_match_codeless_products() {
        let index = CatalogIndex::build(vec![product("Alfa", None, None)]);
        let config = ReconcileConfig::default();
        assert!(
            IdentityResolver::new(&config)
                .find_match(&index, &line(None, "Zeta"))
                .is_none()
        );
    }

    #[test]
    fn suggestions_list_code_hits_before_similar_names() {
        let index = CatalogIndex::build(vec![
            product("Widget Azul", None, None),
            product("Caja 55012 grande", None, None),
            product("Widget Azul Claro", None, None),
        ]);
        let config = ReconcileConfig::default();
        let resolver = IdentityResolver::new(&config);
        let l = line(None, "Widget Azul Marino 55012");

        assert!(resolver.find_match(&index, &l).is_none());
        let suggestions = resolver.suggest(&index, &l);

        assert!(!suggestions.is_empty());
        assert!(suggestions.len() <= config.max_suggestions);
        assert_eq!(suggestions[0].name, "Caja 55012 grande");
        assert_eq!(
            suggestions[0].reason,
            SuggestionReason::EmbeddedCode {
                code: "55012".to_string()
            }
        );
        let ids: HashSet<_> = suggestions.iter().map(|s| s.product_id).collect();
        assert_eq!(ids.len(), suggestions.len());
        assert!(
            suggestions[1..]
                .iter()
                .all(|s| s.reason == SuggestionReason::SimilarName && s.score >= 0.6)
        );
    }

    #[test]
    fn suggestions_are_capped() {
        let index = CatalogIndex::build(vec![
            product("Tuerca 1", None, None),
            product("Tuerca 2", None, None),
            product("Tuerca 3", None, None),
            product("Tuerca 4", None, None),
        ]);
        let config = ReconcileConfig {
            max_suggestions: 2,
            ..ReconcileConfig::default()
        };
        let resolver = IdentityResolver::new(&config);
        let suggestions = resolver.suggest(&index, &line(None, "Tuerca 9"));
        assert_eq!(suggestions.len(), 2);
        assert!(suggestions[0].score >= suggestions[1].score);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a line whose code equals an existing SKU always resolves to
            /// that product, whatever its name says.
            #[test]
            fn sku_match_takes_precedence(name in "[A-Za-z ]{1,30}") {
                let index = catalog();
                let config = ReconcileConfig::default();
                let m = IdentityResolver::new(&config)
                    .find_match(&index, &line(Some("TH-9"), &format!("x{name}")));
                prop_assert!(m.is_some());
                let m = m.unwrap();
                prop_assert_eq!(m.rule, MatchRule::Sku);
                prop_assert_eq!(m.product_id, index.products()[2].id);
            }
        }
    }
}
