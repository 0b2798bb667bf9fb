//! Field-level validation and sanitisation, shared by both input paths.
//!
//! CSV rows ([`MappedRow`]), extracted document items ([`RawItem`]) and
//! operator-edited JSON items all go through the same [`ItemValidator`], so
//! an item is accepted or rejected identically regardless of where it came
//! from. Rules run independently per field and every failure is collected;
//! a row with a blank name *and* a bad price reports both.

use crate::error::RowError;
use crate::model::{CanonicalField, CanonicalMenuItem, MappedRow, RawItem};
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Default currency applied when a source has none.
pub const DEFAULT_CURRENCY: &str = "LKR";

/// Read access to the raw, stringly-typed value of each canonical field.
pub trait ItemFields {
    /// Raw value for `field`, or `None` when the source has no such value.
    fn field(&self, field: CanonicalField) -> Option<Cow<'_, str>>;
}

impl ItemFields for MappedRow {
    fn field(&self, field: CanonicalField) -> Option<Cow<'_, str>> {
        self.get(field).map(Cow::Borrowed)
    }
}

impl ItemFields for RawItem {
    fn field(&self, field: CanonicalField) -> Option<Cow<'_, str>> {
        match field {
            CanonicalField::Category => Some(Cow::Borrowed(&self.category)),
            CanonicalField::Name => Some(Cow::Borrowed(&self.name)),
            CanonicalField::Description => Some(Cow::Borrowed(&self.description)),
            CanonicalField::Price => Some(Cow::Owned(self.price.to_string())),
            CanonicalField::Currency => Some(Cow::Borrowed(&self.currency)),
            CanonicalField::IsAvailable => None,
        }
    }
}

/// JSON objects keyed by canonical field name, e.g. items edited by an
/// operator after a document preview. Non-string scalars are stringified.
impl ItemFields for Map<String, Value> {
    fn field(&self, field: CanonicalField) -> Option<Cow<'_, str>> {
        match self.get(field.as_str())? {
            Value::Null => None,
            Value::String(s) => Some(Cow::Borrowed(s)),
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

/// The fields that survived sanitisation. Required fields that failed
/// validation are `None`; optional ones always carry a value or default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub currency: String,
    pub is_available: bool,
}

/// Outcome of validating one row or item.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub ordinal: usize,
    pub sanitized: SanitizedFields,
    pub errors: Vec<RowError>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Materialise the item if validation passed, attaching `owner_id`.
    /// Otherwise hand back the collected errors.
    pub fn into_item(self, owner_id: &str) -> Result<CanonicalMenuItem, Vec<RowError>> {
        let SanitizedFields {
            category,
            name,
            description,
            price,
            currency,
            is_available,
        } = self.sanitized;
        match (self.errors.is_empty(), category, name, price) {
            (true, Some(category), Some(name), Some(price)) => Ok(CanonicalMenuItem::from_parts(
                owner_id.to_string(),
                category,
                name,
                description,
                price,
                currency,
                is_available,
            )),
            _ => Err(self.errors),
        }
    }
}

/// Validates and sanitises items against the canonical schema.
#[derive(Debug, Clone)]
pub struct ItemValidator {
    default_currency: String,
}

impl Default for ItemValidator {
    fn default() -> Self {
        Self::new(DEFAULT_CURRENCY)
    }
}

impl ItemValidator {
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into().trim().to_uppercase(),
        }
    }

    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Validate one item. `ordinal` is the 1-based row or item number used
    /// in error messages.
    pub fn validate<T: ItemFields + ?Sized>(&self, input: &T, ordinal: usize) -> Validation {
        let mut errors = Vec::new();

        let category = non_blank(input.field(CanonicalField::Category));
        if category.is_none() {
            errors.push(RowError::new(ordinal, format!("Row {ordinal}: Category is required")));
        }

        let name = non_blank(input.field(CanonicalField::Name));
        if name.is_none() {
            errors.push(RowError::new(ordinal, format!("Row {ordinal}: Name is required")));
        }

        let description = input
            .field(CanonicalField::Description)
            .map(|d| d.trim().to_string())
            .unwrap_or_default();

        let price = input
            .field(CanonicalField::Price)
            .and_then(|p| parse_price(&p));
        if price.is_none() {
            errors.push(RowError::new(
                ordinal,
                format!("Row {ordinal}: Price must be a valid positive number"),
            ));
        }

        let currency = non_blank(input.field(CanonicalField::Currency))
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| self.default_currency.clone());

        let is_available = input
            .field(CanonicalField::IsAvailable)
            .map(|v| parse_availability(&v))
            .unwrap_or(true);

        Validation {
            ordinal,
            sanitized: SanitizedFields {
                category,
                name,
                description,
                price,
                currency,
                is_available,
            },
            errors,
        }
    }
}

fn non_blank(value: Option<Cow<'_, str>>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Finite, non-negative decimal; anything else is rejected.
fn parse_price(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
}

fn parse_availability(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}
