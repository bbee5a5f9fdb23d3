//! Invoice-to-catalog reconciliation core (pure, deterministic, no IO).
//!
//! Flow for one document:
//!
//! 1. [`aggregate::aggregate_lines`] folds raw lines that name the same product.
//! 2. [`index::CatalogIndex`] is built once from the catalog snapshot.
//! 3. [`engine::ReconciliationEngine`] resolves every line through
//!    [`resolver::IdentityResolver`], mutates the index in place (so later lines
//!    see products created by earlier ones) and emits a [`engine::ReconciliationPlan`]:
//!    the complete set of mutations plus the per-line report.
//!
//! Persisting the plan atomically is the caller's job.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod ledger;
pub mod line;
pub mod merge;
pub mod normalize;
pub mod resolver;

pub use aggregate::{AggregatedLine, AggregationReport, GroupKey, aggregate_lines};
pub use config::{ReconcileConfig, SimilarityAlgorithm, SkuPolicy};
pub use engine::{
    LineOutcome, LineStatus, LineWarning, ReconciliationEngine, ReconciliationPlan, ReconciliationReport,
    RunStatus,
};
pub use error::{
    CodeField, DuplicateCodeError, LineError, LineErrorKind, ParseError, ReconcileError,
    ReconcileResult,
};
pub use index::{CatalogIndex, NameCollision};
pub use ledger::{BatchDetails, BatchLedger, BatchLine, BatchSummary};
pub use line::{ExtractedDocument, LineItemExtractor, RawLineItem};
pub use merge::{MergePlan, fold_batch_items, plan_merge};
pub use normalize::{extract_embedded_codes, normalize_code, normalize_name};
pub use resolver::{IdentityResolver, Match, MatchRule, Suggestion, SuggestionReason};
