//! Domain types shared by the tabular and document paths.
//!
//! The raw shapes ([`RawRow`], [`MappedRow`], [`RawItem`]) are what parsers
//! and the extraction adapter produce. [`CanonicalMenuItem`] is what the
//! validator produces, and only the validator: its fields are private and it
//! has no public constructor, so holding one proves the record passed
//! validation.

use crate::pipeline::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One of the fixed target schema fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Category,
    Name,
    Description,
    Price,
    Currency,
    IsAvailable,
}

impl CanonicalField {
    /// All fields in declaration order. Mapping and suggestion both iterate
    /// in this order, so it decides ties.
    pub const ALL: [CanonicalField; 6] = [
        CanonicalField::Category,
        CanonicalField::Name,
        CanonicalField::Description,
        CanonicalField::Price,
        CanonicalField::Currency,
        CanonicalField::IsAvailable,
    ];

    /// Fields a tabular source must map before rows are processed.
    pub const REQUIRED: [CanonicalField; 3] = [
        CanonicalField::Category,
        CanonicalField::Name,
        CanonicalField::Price,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Category => "category",
            CanonicalField::Name => "name",
            CanonicalField::Description => "description",
            CanonicalField::Price => "price",
            CanonicalField::Currency => "currency",
            CanonicalField::IsAvailable => "is_available",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    /// Accepts the field name in any spelling that normalises to it,
    /// e.g. `"Is Available"` or `"is-available"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        CanonicalField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == key)
            .ok_or_else(|| format!("unknown menu field '{s}'"))
    }
}

/// A parsed CSV data row: original headers with their raw values, in column
/// order, tagged with a 1-based ordinal for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub ordinal: usize,
    pub cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(ordinal: usize, cells: Vec<(String, String)>) -> Self {
        Self { ordinal, cells }
    }

    /// Raw value under an original header, if the row has that column.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }
}

/// A row after the column mapping has been applied: canonical field → raw
/// string, still unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedRow {
    pub ordinal: usize,
    pub fields: BTreeMap<CanonicalField, String>,
}

impl MappedRow {
    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }
}

/// One item coerced out of the extraction service's response, before it
/// goes through the shared validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub category: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub currency: String,
}

/// A fully validated menu item, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMenuItem {
    #[serde(rename = "ownerId")]
    owner_id: String,
    category: String,
    name: String,
    description: String,
    price: f64,
    currency: String,
    is_available: bool,
}

impl CanonicalMenuItem {
    /// Only the validator and the stores (re-hydrating rows that were
    /// validated before they were written) may build one.
    pub(crate) fn from_parts(
        owner_id: String,
        category: String,
        name: String,
        description: String,
        price: f64,
        currency: String,
        is_available: bool,
    ) -> Self {
        Self {
            owner_id,
            category,
            name,
            description,
            price,
            currency,
            is_available,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_available(&self) -> bool {
        self.is_available
    }
}
