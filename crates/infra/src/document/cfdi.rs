//! Mexican electronic invoice (CFDI 3.3 / 4.0) extractor.
//!
//! One line item per `Concepto`:
//!
//! | field | source |
//! |-------|--------|
//! | code | `NoIdentificacion` (absent: no code) |
//! | name | `Descripcion` |
//! | quantity | `Cantidad` |
//! | unit cost | `ValorUnitario` |
//! | unit cost with tax | (`Importe` + IVA `Traslado` importes) / quantity |
//!
//! Only `Traslado` elements nested in the `Concepto` with `Impuesto="002"` (IVA)
//! count; document-level tax summaries are ignored.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use restock_reconcile::{ExtractedDocument, LineError, LineItemExtractor, ParseError, RawLineItem};

const IVA: &str = "002";

#[derive(Debug, Clone, Copy, Default)]
pub struct CfdiExtractor;

impl CfdiExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// `Concepto` being read; numbers stay raw until the element closes.
#[derive(Debug, Default)]
struct Concept {
    line: usize,
    code: Option<String>,
    name: String,
    quantity: Option<String>,
    unit_cost: Option<String>,
    subtotal: Option<String>,
    iva: f64,
    error: Option<LineError>,
}

impl Concept {
    fn open(line: usize, element: &BytesStart<'_>) -> Self {
        let mut concept = Concept {
            line,
            ..Concept::default()
        };
        for (key, value) in attributes(element) {
            match key.as_str() {
                "NoIdentificacion" => concept.code = Some(value).filter(|c| !c.is_empty()),
                "Descripcion" => concept.name = value,
                "Cantidad" => concept.quantity = Some(value),
                "ValorUnitario" => concept.unit_cost = Some(value),
                "Importe" => concept.subtotal = Some(value),
                _ => {}
            }
        }
        concept
    }

    fn add_transfer(&mut self, element: &BytesStart<'_>) {
        let mut tax = None;
        let mut amount = None;
        for (key, value) in attributes(element) {
            match key.as_str() {
                "Impuesto" => tax = Some(value),
                "Importe" => amount = Some(value),
                _ => {}
            }
        }
        if tax.as_deref() != Some(IVA) {
            return;
        }
        // Exempt transfers carry no Importe.
        let Some(amount) = amount else { return };
        match number(self.line, "Traslado.Importe", Some(&amount)) {
            Ok(value) => self.iva += value,
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
    }

    fn close(self) -> Result<RawLineItem, LineError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let quantity = number(self.line, "Cantidad", self.quantity.as_deref())?;
        let unit_cost = number(self.line, "ValorUnitario", self.unit_cost.as_deref())?;
        let subtotal = match self.subtotal.as_deref() {
            Some(raw) => number(self.line, "Importe", Some(raw))?,
            None => quantity * unit_cost,
        };
        let unit_cost_with_tax = if quantity > 0.0 {
            (subtotal + self.iva) / quantity
        } else {
            0.0
        };

        let mut item = RawLineItem::new(
            self.line,
            None,
            &self.name,
            quantity,
            unit_cost,
            unit_cost_with_tax,
        );
        item.code = self.code;
        Ok(item)
    }
}

impl LineItemExtractor for CfdiExtractor {
    fn extract_line_items(&self, document: &[u8]) -> Result<ExtractedDocument, ParseError> {
        let xml = super::utf8(document)?;
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut out = ExtractedDocument::default();
        let mut saw_root = false;
        let mut current: Option<Concept> = None;
        let mut seen = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => match local_name(&e).as_str() {
                    "Comprobante" => saw_root = true,
                    "Concepto" => {
                        seen += 1;
                        current = Some(Concept::open(seen, &e));
                    }
                    "Traslado" => {
                        if let Some(concept) = current.as_mut() {
                            concept.add_transfer(&e);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Empty(e)) => match local_name(&e).as_str() {
                    "Comprobante" => saw_root = true,
                    "Concepto" => {
                        seen += 1;
                        push(&mut out, Concept::open(seen, &e).close());
                    }
                    "Traslado" => {
                        if let Some(concept) = current.as_mut() {
                            concept.add_transfer(&e);
                        }
                    }
                    _ => {}
                },
                Ok(Event::End(e)) => {
                    if e.local_name().as_ref() == b"Concepto" {
                        if let Some(concept) = current.take() {
                            push(&mut out, concept.close());
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ParseError::new(format!(
                        "XML error at byte {}: {e}",
                        reader.buffer_position()
                    )));
                }
                _ => {}
            }
        }

        if !saw_root {
            return Err(ParseError::new("document has no CFDI Comprobante element"));
        }
        debug!(
            items = out.items.len(),
            rejected = out.rejected.len(),
            "cfdi document read"
        );
        Ok(out)
    }
}

fn push(out: &mut ExtractedDocument, result: Result<RawLineItem, LineError>) {
    match result {
        Ok(item) => out.items.push(item),
        Err(err) => {
            warn!(error = %err, "cfdi concept rejected");
            out.rejected.push(err);
        }
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn attributes(element: &BytesStart<'_>) -> Vec<(String, String)> {
    element
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().unwrap_or_default().trim().to_string();
            (key, value)
        })
        .collect()
}

fn number(line: usize, field: &str, raw: Option<&str>) -> Result<f64, LineError> {
    let raw = raw.unwrap_or_default();
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LineError::invalid_number(line, field, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use restock_reconcile::LineErrorKind;

    const INVOICE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4" Version="4.0" Folio="118">
  <cfdi:Emisor Rfc="AAA010101AAA" Nombre="Ferreteria Central"/>
  <cfdi:Conceptos>
    <cfdi:Concepto ClaveProdServ="31161500" NoIdentificacion="X1" Cantidad="10" ClaveUnidad="H87"
        Descripcion="Tornillo hexagonal 1/4 &amp; tuerca" ValorUnitario="1.00" Importe="10.00">
      <cfdi:Impuestos>
        <cfdi:Traslados>
          <cfdi:Traslado Base="10.00" Impuesto="002" TipoFactor="Tasa" TasaOCuota="0.160000" Importe="1.60"/>
          <cfdi:Traslado Base="10.00" Impuesto="003" TipoFactor="Tasa" TasaOCuota="0.080000" Importe="0.80"/>
        </cfdi:Traslados>
      </cfdi:Impuestos>
    </cfdi:Concepto>
    <cfdi:Concepto ClaveProdServ="31211500" Cantidad="2" Descripcion="Pintura Vinilica 19L 45012"
        ValorUnitario="850.50"/>
    <cfdi:Concepto NoIdentificacion="BAD" Cantidad="tres" Descripcion="Lija" ValorUnitario="5"/>
  </cfdi:Conceptos>
  <cfdi:Impuestos TotalImpuestosTrasladados="1.60">
    <cfdi:Traslados>
      <cfdi:Traslado Base="10.00" Impuesto="002" TipoFactor="Tasa" TasaOCuota="0.160000" Importe="1.60"/>
    </cfdi:Traslados>
  </cfdi:Impuestos>
</cfdi:Comprobante>"#;

    #[test]
    fn reads_concepts_with_nested_iva() {
        let doc = CfdiExtractor::new()
            .extract_line_items(INVOICE.as_bytes())
            .unwrap();
        assert_eq!(doc.items.len(), 2);

        let first = &doc.items[0];
        assert_eq!(first.line, 1);
        assert_eq!(first.code.as_deref(), Some("X1"));
        assert_eq!(first.name, "Tornillo hexagonal 1/4 & tuerca");
        assert_eq!(first.quantity, 10.0);
        assert_eq!(first.unit_cost, 1.0);
        assert!((first.unit_cost_with_tax - 1.16).abs() < 1e-9);

        let second = &doc.items[1];
        assert_eq!(second.code, None);
        assert_eq!(second.quantity, 2.0);
        assert_eq!(second.unit_cost_with_tax, 850.50);
    }

    #[test]
    fn bad_number_rejects_only_its_line() {
        let doc = CfdiExtractor::new()
            .extract_line_items(INVOICE.as_bytes())
            .unwrap();
        assert_eq!(doc.rejected.len(), 1);
        assert_eq!(doc.rejected[0].line, 3);
        assert_eq!(
            doc.rejected[0].kind,
            LineErrorKind::InvalidNumber {
                field: "Cantidad".to_string(),
                value: "tres".to_string()
            }
        );
    }

    #[test]
    fn unreadable_documents_are_parse_errors() {
        let extractor = CfdiExtractor::new();
        assert!(extractor.extract_line_items(&[0xff, 0xfe, 0x00]).is_err());
        assert!(extractor.extract_line_items(b"<a><b></a>").is_err());
        let err = extractor
            .extract_line_items(b"<Factura><Concepto Cantidad=\"1\"/></Factura>")
            .unwrap_err();
        assert!(err.cause.contains("Comprobante"));
    }

    #[test]
    fn cfdi_3_3_namespace_is_accepted() {
        let xml = r#"<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/3" Version="3.3">
            <cfdi:Conceptos>
              <cfdi:Concepto NoIdentificacion="A-1" Cantidad="1.5" Descripcion="Cable" ValorUnitario="12" Importe="18"/>
            </cfdi:Conceptos></cfdi:Comprobante>"#;
        let doc = CfdiExtractor::new().extract_line_items(xml.as_bytes()).unwrap();
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].unit_cost_with_tax, 12.0);
    }
}
