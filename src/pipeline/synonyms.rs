//! Known header spellings for each canonical field.
//!
//! A [`SynonymDictionary`] is a plain immutable value handed to
//! [`crate::pipeline::mapper::ColumnMapper`]; nothing reads a global table.
//! The built-in set lives in [`SynonymDictionary::default`], and tests or
//! deployments with odd vendor exports can build their own with
//! [`SynonymDictionary::new`].

use crate::model::CanonicalField;
use crate::pipeline::normalize::normalize;

/// Built-in spellings, in field declaration order.
const BUILTIN: &[(CanonicalField, &[&str])] = &[
    (
        CanonicalField::Category,
        &["category", "cat", "type", "item_type", "menu_category", "section"],
    ),
    (
        CanonicalField::Name,
        &[
            "name",
            "item_name",
            "item",
            "dish",
            "dish_name",
            "product",
            "product_name",
            "title",
        ],
    ),
    (
        CanonicalField::Description,
        &["description", "desc", "details", "info", "item_description", "about"],
    ),
    (
        CanonicalField::Price,
        &["price", "cost", "amount", "rate", "unit_price", "value"],
    ),
    (CanonicalField::Currency, &["currency", "curr", "currency_code"]),
    (
        CanonicalField::IsAvailable,
        &["is_available", "available", "in_stock", "status", "active", "enabled"],
    ),
];

/// Canonical field → accepted header spellings, stored pre-normalised.
///
/// Entries keep their insertion order; lookup walks them in that order and
/// the first field claiming a spelling wins, so overlapping sets resolve
/// deterministically in favour of the earlier field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymDictionary {
    entries: Vec<(CanonicalField, Vec<String>)>,
}

impl SynonymDictionary {
    /// Build a dictionary from `(field, spellings)` pairs. Spellings are
    /// normalised on the way in; empty results are discarded.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (CanonicalField, Vec<S>)>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|(field, spellings)| {
                let normalised = spellings
                    .iter()
                    .map(|s| normalize(s.as_ref()))
                    .filter(|s| !s.is_empty())
                    .collect();
                (field, normalised)
            })
            .collect();
        Self { entries }
    }

    /// Field whose synonym set contains `normalized_header`, if any.
    ///
    /// The argument must already be normalised.
    pub fn lookup(&self, normalized_header: &str) -> Option<CanonicalField> {
        self.entries
            .iter()
            .find(|(_, spellings)| spellings.iter().any(|s| s == normalized_header))
            .map(|(field, _)| *field)
    }

    #[cfg(test)]
    fn spellings(&self, field: CanonicalField) -> &[String] {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, s)| s.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for SynonymDictionary {
    fn default() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(field, spellings)| (*field, spellings.to_vec())),
        )
    }
}
