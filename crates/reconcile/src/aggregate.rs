//! Folds raw lines that name the same product within one document.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use restock_catalog::clean_code;

use crate::error::{LineError, LineErrorKind};
use crate::line::RawLineItem;
use crate::normalize::{extract_embedded_codes, normalize_code, normalize_name};

/// Grouping key: the normalized code when the line has one, else the normalized name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "by", content = "key", rename_all = "lowercase")]
pub enum GroupKey {
    Code(String),
    Name(String),
}

/// One logical product line of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedLine {
    pub key: GroupKey,
    /// Code and name as first seen (trimmed).
    pub code: Option<String>,
    pub upc: Option<String>,
    pub name: String,
    pub code_key: String,
    pub upc_key: String,
    pub name_key: String,
    pub embedded_codes: BTreeSet<String>,
    pub quantity: f64,
    /// Volume-weighted unit cost: `total_value / quantity`.
    pub unit_cost: f64,
    /// Tax-inclusive unit cost of the first occurrence.
    pub unit_cost_with_tax: f64,
    pub total_value: f64,
    /// Source line numbers folded into this line.
    pub source_lines: Vec<usize>,
}

impl AggregatedLine {
    fn start(key: GroupKey, item: &RawLineItem, name: &str) -> Self {
        let code = clean_code(item.code.as_deref());
        let upc = clean_code(item.upc.as_deref());
        Self {
            key,
            code_key: normalize_code(code.as_deref()),
            upc_key: normalize_code(upc.as_deref()),
            name_key: normalize_name(name),
            embedded_codes: extract_embedded_codes(name),
            code,
            upc,
            name: name.to_string(),
            quantity: item.quantity,
            unit_cost: item.unit_cost,
            unit_cost_with_tax: item.unit_cost_with_tax,
            total_value: item.quantity * item.unit_cost,
            source_lines: vec![item.line],
        }
    }

    fn fold(&mut self, item: &RawLineItem) {
        self.quantity += item.quantity;
        self.total_value += item.quantity * item.unit_cost;
        self.unit_cost = self.total_value / self.quantity;
        if self.upc.is_none() {
            if let Some(upc) = clean_code(item.upc.as_deref()) {
                self.upc_key = normalize_code(Some(&upc));
                self.upc = Some(upc);
            }
        }
        self.source_lines.push(item.line);
    }

    /// First source line, used when reporting problems with the aggregate.
    pub fn first_line(&self) -> usize {
        self.source_lines.first().copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregationReport {
    /// Aggregated lines in order of first occurrence.
    pub lines: Vec<AggregatedLine>,
    pub rejected: Vec<LineError>,
}

/// Validate and group raw lines.
///
/// Lines with no name, a non-positive quantity or a negative/non-finite cost
/// are rejected individually; the rest of the document still goes through.
pub fn aggregate_lines(items: &[RawLineItem]) -> AggregationReport {
    let mut report = AggregationReport::default();
    let mut positions: HashMap<GroupKey, usize> = HashMap::new();

    for item in items {
        if let Err(err) = validate(item) {
            report.rejected.push(err);
            continue;
        }

        let name = item.name.trim();
        let code_key = normalize_code(item.code.as_deref());
        let key = if code_key.is_empty() {
            GroupKey::Name(normalize_name(name))
        } else {
            GroupKey::Code(code_key)
        };

        match positions.get(&key) {
            Some(&pos) => report.lines[pos].fold(item),
            None => {
                positions.insert(key.clone(), report.lines.len());
                report.lines.push(AggregatedLine::start(key, item, name));
            }
        }
    }

    report
}

fn validate(item: &RawLineItem) -> Result<(), LineError> {
    if normalize_name(&item.name).is_empty() {
        return Err(LineError::new(item.line, LineErrorKind::MissingName));
    }
    if !item.quantity.is_finite() || item.quantity <= 0.0 {
        return Err(LineError::new(
            item.line,
            LineErrorKind::InvalidQuantity {
                quantity: item.quantity,
            },
        ));
    }
    for (field, value) in [
        ("unit_cost", item.unit_cost),
        ("unit_cost_with_tax", item.unit_cost_with_tax),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(LineError::new(
                item.line,
                LineErrorKind::InvalidAmount {
                    field: field.to_string(),
                    value,
                },
            ));
        }
    }
    Ok(())
}
