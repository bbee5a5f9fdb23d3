//! Document extractors: raw bytes in, line items out.

pub mod cfdi;
pub mod text;

pub use cfdi::CfdiExtractor;
pub use text::TextLineExtractor;

use restock_reconcile::ParseError;

/// UTF-8 view of a document, without a leading byte-order mark.
fn utf8(document: &[u8]) -> Result<&str, ParseError> {
    let text = std::str::from_utf8(document)
        .map_err(|e| ParseError::new(format!("document is not valid UTF-8: {e}")))?;
    Ok(text.trim_start_matches('\u{feff}'))
}
