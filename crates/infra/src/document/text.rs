//! Plain-text line extractor for documents already converted to text.
//!
//! A line is a candidate when it reads `CODE  description  quantity  price`,
//! with the price carrying two decimals. Anything else (headers, totals,
//! addresses) is ignored. The price is used for both the pre- and post-tax cost.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use restock_reconcile::{ExtractedDocument, LineError, LineItemExtractor, ParseError, RawLineItem};

static ITEM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<code>[A-Z0-9][A-Z0-9-]*)\s+(?P<name>.+?)\s+(?P<quantity>\d+(?:\.\d+)?)\s+\$?(?P<price>\d[\d,]*\.\d{2})\s*$",
    )
    .expect("item line pattern compiles")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct TextLineExtractor;

impl TextLineExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl LineItemExtractor for TextLineExtractor {
    fn extract_line_items(&self, document: &[u8]) -> Result<ExtractedDocument, ParseError> {
        let text = super::utf8(document)?;
        let mut out = ExtractedDocument::default();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let Some(caps) = ITEM_LINE.captures(raw) else {
                continue;
            };
            let quantity = &caps["quantity"];
            let price = caps["price"].replace(',', "");
            let quantity = match quantity.parse::<f64>() {
                Ok(q) => q,
                Err(_) => {
                    out.rejected.push(LineError::invalid_number(line, "quantity", quantity));
                    continue;
                }
            };
            let price = match price.parse::<f64>() {
                Ok(p) => p,
                Err(_) => {
                    out.rejected.push(LineError::invalid_number(line, "price", &price));
                    continue;
                }
            };
            out.items.push(RawLineItem::new(
                line,
                Some(&caps["code"]),
                caps["name"].trim(),
                quantity,
                price,
                price,
            ));
        }

        debug!(items = out.items.len(), "text document read");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_item_lines_and_ignores_the_rest() {
        let text = "FERRETERIA CENTRAL\n\
                    CLAVE  DESCRIPCION  CANT  PRECIO\n\
                    X1 Tornillo hexagonal 1/4 10 1.00\n\
                    PV-19 Pintura Vinilica 19L 2 $1,250.50\n\
                    TOTAL 2511.00\n";
        let doc = TextLineExtractor::new()
            .extract_line_items(text.as_bytes())
            .unwrap();

        assert_eq!(doc.items.len(), 2);
        assert_eq!(doc.items[0].line, 3);
        assert_eq!(doc.items[0].code.as_deref(), Some("X1"));
        assert_eq!(doc.items[0].name, "Tornillo hexagonal 1/4");
        assert_eq!(doc.items[0].quantity, 10.0);
        assert_eq!(doc.items[1].unit_cost, 1250.50);
        assert_eq!(doc.items[1].unit_cost_with_tax, 1250.50);
        assert!(doc.rejected.is_empty());
    }

    #[test]
    fn non_utf8_is_a_parse_error() {
        assert!(TextLineExtractor::new().extract_line_items(&[0xc3, 0x28]).is_err());
    }
}
