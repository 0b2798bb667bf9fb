//! Best-effort hints for columns the mapper could not place.
//!
//! Deliberately simple: a column is a candidate for every canonical field
//! whose bare name is a substring of the normalised column (or vice versa).
//! `"Selling Price"` → `price`; `"avail"` → `is_available`. The result is
//! only shown to the operator, who confirms it by resubmitting with an
//! explicit override.

use crate::model::CanonicalField;
use crate::pipeline::normalize::normalize;
use crate::report::Suggestion;

/// Suggest candidate fields for each unmapped column.
///
/// Columns with no candidate are left out.
pub fn suggest(unmapped_columns: &[String]) -> Vec<Suggestion> {
    unmapped_columns
        .iter()
        .filter_map(|column| {
            let normalized = normalize(column);
            if normalized.is_empty() {
                return None;
            }
            let suggested_fields: Vec<CanonicalField> = CanonicalField::ALL
                .iter()
                .copied()
                .filter(|field| {
                    let name = field.as_str();
                    normalized.contains(name) || name.contains(normalized.as_str())
                })
                .collect();
            if suggested_fields.is_empty() {
                None
            } else {
                Some(Suggestion {
                    column: column.clone(),
                    suggested_fields,
                })
            }
        })
        .collect()
}
