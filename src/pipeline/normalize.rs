//! Header normalisation: the single comparison key for column names.
//!
//! Every place that compares a source header against something (synonyms,
//! operator overrides, the row transformer, suggestions) goes through
//! [`normalize`], so `"Item Name"`, `"item-name"` and `" ITEM__NAME "` are
//! all the same column.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").unwrap());

// Separators survive this pass so they can be collapsed afterwards.
static RE_DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_\s-]").unwrap());

/// Canonicalise a header for comparison.
///
/// Lower-cases, trims, collapses runs of whitespace, `-` and `_` into a
/// single `_`, and drops anything outside `[a-z0-9_]`. Disallowed characters
/// are dropped *before* collapsing, so `"a $ b"` becomes `"a_b"` rather than
/// `"a__b"`; that ordering is what keeps the function idempotent. May return
/// an empty string.
pub fn normalize(header: &str) -> String {
    let lowered = header.to_lowercase();
    let stripped = RE_DISALLOWED.replace_all(&lowered, "");
    RE_SEPARATORS
        .replace_all(stripped.trim(), "_")
        .into_owned()
}
