//! Line items as they come out of a parsed document.

use serde::{Deserialize, Serialize};

use crate::error::{LineError, ParseError};

/// One row extracted from a source document. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLineItem {
    /// 1-based position in the source document.
    pub line: usize,
    /// Supplier code (SKU-like), if the document carries one.
    pub code: Option<String>,
    /// Barcode, if the document carries one.
    #[serde(default)]
    pub upc: Option<String>,
    pub name: String,
    pub quantity: f64,
    /// Unit cost before tax.
    pub unit_cost: f64,
    /// Unit cost after tax.
    pub unit_cost_with_tax: f64,
}

impl RawLineItem {
    pub fn new(
        line: usize,
        code: Option<&str>,
        name: &str,
        quantity: f64,
        unit_cost: f64,
        unit_cost_with_tax: f64,
    ) -> Self {
        Self {
            line,
            code: code.map(str::to_string),
            upc: None,
            name: name.to_string(),
            quantity,
            unit_cost,
            unit_cost_with_tax,
        }
    }

    pub fn with_upc(mut self, upc: &str) -> Self {
        self.upc = Some(upc.to_string());
        self
    }
}

/// Everything an extractor pulled out of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedDocument {
    pub items: Vec<RawLineItem>,
    /// Lines the extractor found but could not read (bad numbers etc.).
    pub rejected: Vec<LineError>,
}

/// Document-parsing collaborator: turns raw bytes into line items.
///
/// A structurally unreadable document is a [`ParseError`]; a single unreadable
/// line goes to [`ExtractedDocument::rejected`] instead.
pub trait LineItemExtractor: Send + Sync {
    fn extract_line_items(&self, document: &[u8]) -> Result<ExtractedDocument, ParseError>;
}

impl<E> LineItemExtractor for std::sync::Arc<E>
where
    E: LineItemExtractor + ?Sized,
{
    fn extract_line_items(&self, document: &[u8]) -> Result<ExtractedDocument, ParseError> {
        (**self).extract_line_items(document)
    }
}
