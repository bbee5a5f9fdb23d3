//! Canonical comparison keys for product codes and names.
//!
//! An empty key means "absent" and never matches anything: two products that
//! both lack a code are not the same product.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static EMBEDDED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9]{4,6}\b").expect("embedded code pattern compiles"));

/// Accent-insensitive, case-insensitive name key.
///
/// Lowercases, strips diacritics, drops parentheses and hyphens, collapses
/// whitespace runs and trims.
pub fn normalize_name(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !matches!(c, '(' | ')' | '-'))
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uppercase alphanumeric code key (`"ab-12 3"` → `"AB123"`).
pub fn normalize_code(text: Option<&str>) -> String {
    text.unwrap_or_default()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Standalone 4–6 digit runs in free text.
///
/// Catalog entries are sometimes known only by a numeric code buried in their
/// description ("Pintura Vinilica 19L 45012").
pub fn extract_embedded_codes(text: &str) -> BTreeSet<String> {
    EMBEDDED_CODE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}
