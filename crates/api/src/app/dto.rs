use serde::Deserialize;

use axum::http::StatusCode;
use restock_core::{BatchId, ProductId};
use restock_infra::PriceUpdate;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Cfdi,
    Text,
}

impl DocumentFormat {
    /// `.txt` uploads are plain text; everything else is treated as CFDI XML.
    pub fn from_label(label: &str) -> Self {
        if label.trim().to_ascii_lowercase().ends_with(".txt") {
            DocumentFormat::Text
        } else {
            DocumentFormat::Cfdi
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub label: Option<String>,
    pub format: Option<DocumentFormat>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricesRequest {
    pub updates: Vec<PriceUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct MergeProductsRequest {
    pub keep_id: ProductId,
    pub discard_id: ProductId,
}

#[derive(Debug, Deserialize)]
pub struct RenameBatchRequest {
    pub label: String,
}

// -------------------------
// Path helpers
// -------------------------

pub fn parse_product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"))
}

pub fn parse_batch_id(raw: &str) -> Result<BatchId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid batch id"))
}
