//! Column mapping: reconcile arbitrary CSV headers with the canonical schema.
//!
//! Resolution order for each header:
//!
//! 1. **Operator override**: an explicit `raw header → field` entry supplied
//!    with the request. Registered first and never displaced.
//! 2. **Synonym dictionary**: the header's normalised form is looked up in
//!    the [`SynonymDictionary`] the mapper was built with.
//! 3. **Unmapped**: reported back (with suggestions) so the operator can
//!    retry with an override.
//!
//! Missing required fields are advisory output, not an error: the caller
//! decides whether to stop.

use crate::error::IngestError;
use crate::model::CanonicalField;
use crate::pipeline::normalize::normalize;
use crate::pipeline::synonyms::SynonymDictionary;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Operator-supplied `raw header → canonical field` overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorMapping {
    entries: BTreeMap<String, CanonicalField>,
}

impl OperatorMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one override.
    pub fn with(mut self, raw_header: impl Into<String>, field: CanonicalField) -> Self {
        self.entries.insert(raw_header.into(), field);
        self
    }

    /// Parse an override set from request text.
    ///
    /// Accepts a JSON object (`{"Item": "name"}`) or a JSON string that
    /// itself encodes such an object, which is what form-encoded uploads
    /// send.
    pub fn parse(input: &str) -> Result<Self, IngestError> {
        let value: Value =
            serde_json::from_str(input).map_err(|e| IngestError::InvalidMappingFormat {
                detail: e.to_string(),
            })?;
        Self::from_json(&value)
    }

    /// Build an override set from an already-decoded JSON value.
    pub fn from_json(value: &Value) -> Result<Self, IngestError> {
        let object = match value {
            Value::Object(map) => map.clone(),
            Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
                Ok(Value::Object(map)) => map,
                Ok(other) => return Err(not_an_object(&other)),
                Err(e) => {
                    return Err(IngestError::InvalidMappingFormat {
                        detail: e.to_string(),
                    })
                }
            },
            other => return Err(not_an_object(other)),
        };

        let mut mapping = Self::new();
        for (raw_header, target) in object {
            let name = target
                .as_str()
                .ok_or_else(|| IngestError::InvalidMappingFormat {
                    detail: format!("target for '{raw_header}' must be a string, got {target}"),
                })?;
            let field = name
                .parse::<CanonicalField>()
                .map_err(|detail| IngestError::InvalidMappingFormat { detail })?;
            mapping.entries.insert(raw_header, field);
        }
        Ok(mapping)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, CanonicalField)> {
        self.entries.iter().map(|(h, f)| (h.as_str(), *f))
    }
}

fn not_an_object(value: &Value) -> IngestError {
    IngestError::InvalidMappingFormat {
        detail: format!("expected an object, got {value}"),
    }
}

/// Resolved `normalised header → canonical field` mapping.
///
/// Built once per request by [`ColumnMapper::map_headers`] and read-only
/// afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    entries: BTreeMap<String, CanonicalField>,
}

impl ColumnMapping {
    /// Field for an already-normalised header.
    pub fn get(&self, normalized_header: &str) -> Option<CanonicalField> {
        self.entries.get(normalized_header).copied()
    }

    /// Field for a raw source header.
    pub fn resolve(&self, raw_header: &str) -> Option<CanonicalField> {
        self.get(&normalize(raw_header))
    }

    pub fn maps_to(&self, field: CanonicalField) -> bool {
        self.entries.values().any(|f| *f == field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, CanonicalField)> {
        self.entries.iter().map(|(h, f)| (h.as_str(), *f))
    }
}

/// Output of [`ColumnMapper::map_headers`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingResult {
    pub mapping: ColumnMapping,
    /// Raw headers that matched nothing, in input order.
    pub unmapped_columns: Vec<String>,
    /// Required fields absent from the mapping, in [`CanonicalField::ALL`] order.
    pub missing_required: Vec<CanonicalField>,
}

impl MappingResult {
    /// `true` when every required field is mapped.
    pub fn is_complete(&self) -> bool {
        self.missing_required.is_empty()
    }

    pub fn missing_required_names(&self) -> Vec<String> {
        self.missing_required
            .iter()
            .map(|f| f.as_str().to_string())
            .collect()
    }
}

/// Resolves source headers against a [`SynonymDictionary`].
#[derive(Debug, Clone, Default)]
pub struct ColumnMapper {
    dictionary: SynonymDictionary,
}

impl ColumnMapper {
    pub fn new(dictionary: SynonymDictionary) -> Self {
        Self { dictionary }
    }

    /// Map `headers` (in file order) using `overrides` first, then the
    /// dictionary. Never fails.
    pub fn map_headers(&self, headers: &[String], overrides: &OperatorMapping) -> MappingResult {
        let mut entries = BTreeMap::new();
        let mut unmapped_columns = Vec::new();

        for (raw_header, field) in overrides.iter() {
            entries.insert(normalize(raw_header), field);
        }

        for header in headers {
            let normalized = normalize(header);
            if entries.contains_key(&normalized) {
                continue;
            }
            match self.dictionary.lookup(&normalized) {
                Some(field) => {
                    entries.insert(normalized, field);
                }
                None => unmapped_columns.push(header.clone()),
            }
        }

        let mapping = ColumnMapping { entries };
        let missing_required = CanonicalField::ALL
            .into_iter()
            .filter(|f| f.is_required() && !mapping.maps_to(*f))
            .collect::<Vec<_>>();

        debug!(
            "Mapped {} of {} headers ({} overrides), missing required: {:?}",
            mapping.len(),
            headers.len(),
            overrides.iter().count(),
            missing_required
        );

        MappingResult {
            mapping,
            unmapped_columns,
            missing_required,
        }
    }
}
