//! Process configuration read from the environment.
//!
//! | variable | default |
//! |----------|---------|
//! | `BIND_ADDR` | `0.0.0.0:8080` |
//! | `DATABASE_URL` | unset: in-memory store |
//! | `RESTOCK_MAX_DOCUMENT_BYTES` | 10 MiB |
//! | `RESTOCK_COST_CHANGE_THRESHOLD` | 0.1 |
//! | `RESTOCK_SELLING_PRICE_CHANGE_THRESHOLD` | 0.01 |
//! | `RESTOCK_MATCH_THRESHOLD` | 0.85 |
//! | `RESTOCK_SUGGESTION_THRESHOLD` | 0.6 |
//! | `RESTOCK_MAX_SUGGESTIONS` | 3 |
//! | `RESTOCK_SIMILARITY` | `normalized_levenshtein` |
//! | `RESTOCK_SKU_POLICY` | `leave_empty` |
//! | `RESTOCK_PRIORITIZE_SUGGESTED_NEW` | `true` |

use core::str::FromStr;

use anyhow::Context;

use restock_reconcile::ReconcileConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub max_document_bytes: usize,
    pub reconcile: ReconcileConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = AppConfig::default();
        let mut reconcile = defaults.reconcile;

        if let Some(v) = parsed(&get, "RESTOCK_COST_CHANGE_THRESHOLD")? {
            reconcile.cost_change_threshold = v;
        }
        if let Some(v) = parsed(&get, "RESTOCK_SELLING_PRICE_CHANGE_THRESHOLD")? {
            reconcile.selling_price_change_threshold = v;
        }
        if let Some(v) = parsed(&get, "RESTOCK_MATCH_THRESHOLD")? {
            reconcile.match_threshold = v;
        }
        if let Some(v) = parsed(&get, "RESTOCK_SUGGESTION_THRESHOLD")? {
            reconcile.suggestion_threshold = v;
        }
        if let Some(v) = parsed(&get, "RESTOCK_MAX_SUGGESTIONS")? {
            reconcile.max_suggestions = v;
        }
        if let Some(v) = parsed(&get, "RESTOCK_SIMILARITY")? {
            reconcile.similarity = v;
        }
        if let Some(v) = parsed(&get, "RESTOCK_SKU_POLICY")? {
            reconcile.sku_policy = v;
        }
        if let Some(v) = parsed(&get, "RESTOCK_PRIORITIZE_SUGGESTED_NEW")? {
            reconcile.prioritize_suggested_new = v;
        }
        reconcile
            .validate()
            .context("invalid reconciliation settings")?;

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: get("DATABASE_URL"),
            max_document_bytes: parsed(&get, "RESTOCK_MAX_DOCUMENT_BYTES")?
                .unwrap_or(defaults.max_document_bytes),
            reconcile,
        })
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid value for {key}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use restock_reconcile::{SimilarityAlgorithm, SkuPolicy};

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(load(&[]).unwrap(), AppConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/restock"),
            ("RESTOCK_COST_CHANGE_THRESHOLD", "0.5"),
            ("RESTOCK_SIMILARITY", "jaro_winkler"),
            ("RESTOCK_SKU_POLICY", "synthetic"),
            ("RESTOCK_MAX_SUGGESTIONS", "5"),
            ("RESTOCK_PRIORITIZE_SUGGESTED_NEW", "false"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/restock"));
        assert_eq!(config.reconcile.cost_change_threshold, 0.5);
        assert_eq!(config.reconcile.similarity, SimilarityAlgorithm::JaroWinkler);
        assert_eq!(config.reconcile.sku_policy, SkuPolicy::Synthetic);
        assert_eq!(config.reconcile.max_suggestions, 5);
        assert!(!config.reconcile.prioritize_suggested_new);
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        assert_eq!(load(&[("DATABASE_URL", "  ")]).unwrap().database_url, None);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = load(&[("RESTOCK_MATCH_THRESHOLD", "high")]).unwrap_err();
        assert!(format!("{err:#}").contains("RESTOCK_MATCH_THRESHOLD"));
    }

    #[test]
    fn inconsistent_thresholds_are_rejected() {
        assert!(load(&[("RESTOCK_SUGGESTION_THRESHOLD", "0.95")]).is_err());
    }
}
