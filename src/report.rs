//! Serialisable results returned by [`crate::MenuIngestor`].
//!
//! Field names follow the JSON shape upload clients already consume
//! (`totalRows`, `previewData`, ...), hence the camelCase renames.

use crate::error::RowError;
use crate::model::{CanonicalField, CanonicalMenuItem};
use crate::pipeline::mapper::ColumnMapping;
use crate::store::PersistFailure;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Candidate fields for a column the mapper could not place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub column: String,
    pub suggested_fields: Vec<CanonicalField>,
}

/// The mapping a tabular ingestion actually used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSummary {
    pub applied: ColumnMapping,
    pub unmapped_columns: Vec<String>,
}

/// Row counters. For documents a "row" is one extracted item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub saved_rows: usize,
    pub skipped_rows: usize,
}

/// Outcome of one ingestion request.
///
/// Built incrementally while the request runs and handed back whole; the
/// caller never sees a half-filled report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub success: bool,
    pub message: String,
    pub preview: bool,

    /// Source filename (document path only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Page count of the source document (document path only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,

    /// Applied mapping (tabular path only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<MappingSummary>,

    pub summary: Summary,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RowError>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<PersistFailure>,

    /// First valid items, only in preview mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_data: Option<Vec<CanonicalMenuItem>>,

    /// Identifiers the store assigned to saved items.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub saved_ids: Vec<String>,
}

impl IngestionReport {
    pub(crate) fn new(preview: bool, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            preview,
            filename: None,
            pages: None,
            mapping: None,
            summary: Summary::default(),
            errors: Vec::new(),
            failures: Vec::new(),
            preview_data: None,
            saved_ids: Vec::new(),
        }
    }

    /// Rows that made it into the store.
    pub fn saved_count(&self) -> usize {
        self.summary.saved_rows
    }

    /// `true` when some valid items were not persisted.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Message for a non-preview save of `valid` items of which `saved` landed.
pub(crate) fn saved_message(saved: usize, valid: usize) -> String {
    if saved == valid {
        format!("Successfully saved {saved} menu items")
    } else {
        format!("Partially saved: {saved} of {valid} items")
    }
}

/// One raw CSV row as `header → value`, serialised as a JSON object that
/// keeps the file's column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRow(pub Vec<(String, String)>);

impl Serialize for SampleRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (header, value) in &self.0 {
            map.serialize_entry(header, value)?;
        }
        map.end()
    }
}

/// Result of analysing a CSV without ingesting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvAnalysis {
    pub total_rows: usize,
    /// Number of columns.
    pub columns: usize,
    /// Raw headers in file order.
    pub detected_columns: Vec<String>,
    pub auto_mapping: ColumnMapping,
    pub unmapped_columns: Vec<String>,
    pub missing_required_fields: Vec<CanonicalField>,
    pub suggestions: Vec<Suggestion>,
    pub sample_data: Vec<SampleRow>,
    pub ready_to_upload: bool,
}
