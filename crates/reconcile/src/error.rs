//! Error taxonomy of a reconciliation run.
//!
//! - [`ParseError`]: the document is unreadable. Fatal, nothing is mutated.
//! - [`LineError`]: one line is unusable. The line is skipped and reported.
//! - [`DuplicateCodeError`]: a SKU/UPC write would collide with another product.
//!   Only that field update is rejected.
//! - [`ReconcileError::Persistence`] / [`ReconcileError::Conflict`]: the commit
//!   failed and nothing was retained. Conflicts are retryable.

use serde::Serialize;
use thiserror::Error;

use restock_core::{DomainError, ProductId};

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// The source document could not be read at all.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("could not read document: {cause}")]
pub struct ParseError {
    pub cause: String,
}

impl ParseError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Why a single line was left out of a run.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineErrorKind {
    #[error("line has no product name")]
    MissingName,

    #[error("{field} is not a number: '{value}'")]
    InvalidNumber { field: String, value: String },

    #[error("quantity must be positive, got {quantity}")]
    InvalidQuantity { quantity: f64 },

    #[error("{field} must be a non-negative amount, got {value}")]
    InvalidAmount { field: String, value: f64 },

    /// The catalog refused the product built from this line.
    #[error("{reason}")]
    Rejected { reason: String },
}

/// A rejected line, with its 1-based position in the source document.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[error("line {line}: {kind}")]
pub struct LineError {
    pub line: usize,
    #[serde(flatten)]
    pub kind: LineErrorKind,
}

impl LineError {
    pub fn new(line: usize, kind: LineErrorKind) -> Self {
        Self { line, kind }
    }

    pub fn invalid_number(line: usize, field: &str, value: &str) -> Self {
        Self::new(
            line,
            LineErrorKind::InvalidNumber {
                field: field.to_string(),
                value: value.to_string(),
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeField {
    Sku,
    Upc,
}

impl core::fmt::Display for CodeField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CodeField::Sku => f.write_str("SKU"),
            CodeField::Upc => f.write_str("UPC"),
        }
    }
}

/// A SKU/UPC write rejected because another product already holds the code.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("{field} '{code}' for product {product_id} is already used by product {held_by}")]
pub struct DuplicateCodeError {
    pub field: CodeField,
    pub code: String,
    pub product_id: ProductId,
    pub held_by: ProductId,
}

/// Reconciliation failure surfaced to the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    DuplicateCode(#[from] DuplicateCodeError),

    /// Commit failed; the whole run was rolled back.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// A concurrent writer got there first (e.g. the same new SKU). Retry the run.
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The request collides with existing catalog data (not retryable).
    #[error("already exists: {0}")]
    Duplicate(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Conflict(_))
    }

    /// Stable machine-readable classification.
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Parse(_) => "parse_error",
            ReconcileError::DuplicateCode(_) => "duplicate_code",
            ReconcileError::Persistence(_) => "persistence_error",
            ReconcileError::Conflict(_) => "conflict",
            ReconcileError::NotFound(_) => "not_found",
            ReconcileError::Duplicate(_) => "duplicate",
            ReconcileError::Validation(_) => "validation_error",
        }
    }
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                ReconcileError::Validation(msg)
            }
            DomainError::NotFound(what) => ReconcileError::NotFound(what),
            DomainError::Conflict(msg) => ReconcileError::Duplicate(msg),
        }
    }
}
