//! Tunables for matching and price-change detection.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ReconcileError;
use crate::normalize::normalize_name;

/// String-similarity function used for approximate name matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityAlgorithm {
    /// `1 - levenshtein / max_len`.
    #[default]
    NormalizedLevenshtein,
    JaroWinkler,
    /// Bigram overlap (closest in spirit to sequence-ratio matching).
    SorensenDice,
}

impl SimilarityAlgorithm {
    /// Similarity in `[0.0, 1.0]`.
    pub fn score(self, a: &str, b: &str) -> f64 {
        match self {
            SimilarityAlgorithm::NormalizedLevenshtein => strsim::normalized_levenshtein(a, b),
            SimilarityAlgorithm::JaroWinkler => strsim::jaro_winkler(a, b),
            SimilarityAlgorithm::SorensenDice => strsim::sorensen_dice(a, b),
        }
    }
}

impl core::str::FromStr for SimilarityAlgorithm {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normalized_levenshtein" | "levenshtein" => Ok(Self::NormalizedLevenshtein),
            "jaro_winkler" => Ok(Self::JaroWinkler),
            "sorensen_dice" | "dice" => Ok(Self::SorensenDice),
            other => Err(ReconcileError::Validation(format!(
                "unknown similarity algorithm '{other}'"
            ))),
        }
    }
}

/// What SKU a brand-new product gets when the line carries no code at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkuPolicy {
    /// Leave the SKU empty; it can be backfilled by a later document.
    #[default]
    LeaveEmpty,
    /// Derive `PFX-xxxxxx` from the product name.
    Synthetic,
}

impl core::str::FromStr for SkuPolicy {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "leave_empty" | "empty" => Ok(Self::LeaveEmpty),
            "synthetic" => Ok(Self::Synthetic),
            other => Err(ReconcileError::Validation(format!("unknown sku policy '{other}'"))),
        }
    }
}

impl SkuPolicy {
    /// SKU for a product that arrived with no code information at all.
    pub fn sku_for(self, name: &str) -> Option<String> {
        match self {
            SkuPolicy::LeaveEmpty => None,
            SkuPolicy::Synthetic => Some(synthetic_sku(name)),
        }
    }
}

/// `PFX-XXXXXX`: first three letters of the name (or `GEN`) plus six hex
/// digits of the name's SHA-256. Stable for a given name.
fn synthetic_sku(name: &str) -> String {
    let key = normalize_name(name);
    let letters: String = key
        .chars()
        .filter(char::is_ascii_alphabetic)
        .take(3)
        .collect();
    let prefix = if letters.len() == 3 {
        letters.to_ascii_uppercase()
    } else {
        "GEN".to_string()
    };
    let digest = hex::encode_upper(Sha256::digest(key.as_bytes()));
    format!("{prefix}-{}", &digest[..6])
}

/// Reconciliation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Cost moves strictly larger than this are recorded as price changes.
    pub cost_change_threshold: f64,
    /// Selling-price edits strictly larger than this are applied and recorded.
    pub selling_price_change_threshold: f64,
    /// Minimum similarity for an approximate name match to auto-match.
    pub match_threshold: f64,
    /// Minimum similarity for a catalog product to be offered as a suggestion.
    pub suggestion_threshold: f64,
    pub max_suggestions: usize,
    pub similarity: SimilarityAlgorithm,
    pub sku_policy: SkuPolicy,
    /// Order new lines that carry suggestions ahead of new lines without.
    pub prioritize_suggested_new: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            cost_change_threshold: 0.1,
            selling_price_change_threshold: 0.01,
            match_threshold: 0.85,
            suggestion_threshold: 0.6,
            max_suggestions: 3,
            similarity: SimilarityAlgorithm::default(),
            sku_policy: SkuPolicy::default(),
            prioritize_suggested_new: true,
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), ReconcileError> {
        for (name, value) in [
            ("match_threshold", self.match_threshold),
            ("suggestion_threshold", self.suggestion_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReconcileError::Validation(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.suggestion_threshold > self.match_threshold {
            return Err(ReconcileError::Validation(
                "suggestion_threshold cannot exceed match_threshold".to_string(),
            ));
        }
        for (name, value) in [
            ("cost_change_threshold", self.cost_change_threshold),
            ("selling_price_change_threshold", self.selling_price_change_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ReconcileError::Validation(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.max_suggestions == 0 {
            return Err(ReconcileError::Validation(
                "max_suggestions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ReconcileConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: ReconcileConfig =
            serde_json::from_str(r#"{"match_threshold": 0.9, "similarity": "jaro_winkler"}"#)
                .unwrap();
        assert_eq!(cfg.match_threshold, 0.9);
        assert_eq!(cfg.similarity, SimilarityAlgorithm::JaroWinkler);
        assert_eq!(cfg.cost_change_threshold, 0.1);
        assert_eq!(cfg.sku_policy, SkuPolicy::LeaveEmpty);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let cfg = ReconcileConfig {
            match_threshold: 0.5,
            suggestion_threshold: 0.7,
            ..ReconcileConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_and_zero_caps() {
        let cfg = ReconcileConfig {
            match_threshold: 1.5,
            ..ReconcileConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ReconcileConfig {
            max_suggestions: 0,
            ..ReconcileConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ReconcileConfig {
            cost_change_threshold: -0.1,
            ..ReconcileConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_algorithm_and_policy_names() {
        assert_eq!(
            "Sorensen_Dice".parse::<SimilarityAlgorithm>().unwrap(),
            SimilarityAlgorithm::SorensenDice
        );
        assert_eq!("synthetic".parse::<SkuPolicy>().unwrap(), SkuPolicy::Synthetic);
        assert!("ratcliff".parse::<SimilarityAlgorithm>().is_err());
    }

    #[test]
    fn synthetic_sku_is_stable_and_prefixed() {
        let sku = SkuPolicy::Synthetic.sku_for("Widget Azul").unwrap();
        assert!(sku.starts_with("WID-"));
        assert_eq!(sku.len(), 10);
        assert_eq!(SkuPolicy::Synthetic.sku_for("WIDGET  azul").unwrap(), sku);
        assert!(SkuPolicy::Synthetic.sku_for("12 x").unwrap().starts_with("GEN-"));
        assert_eq!(SkuPolicy::LeaveEmpty.sku_for("Widget Azul"), None);
    }

    #[test]
    fn identical_strings_score_one() {
        for algo in [
            SimilarityAlgorithm::NormalizedLevenshtein,
            SimilarityAlgorithm::JaroWinkler,
            SimilarityAlgorithm::SorensenDice,
        ] {
            assert!((algo.score("widget azul", "widget azul") - 1.0).abs() < 1e-9);
        }
    }
}
