//! Error types for the menu-ingest library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`IngestError`] is **fatal**: the request cannot proceed at all
//!   (no file, unsupported format, unmappable columns, extraction service
//!   down). Returned as `Err(IngestError)` from the [`crate::MenuIngestor`]
//!   operations.
//!
//! * [`RowError`] is **non-fatal**: a single row or extracted item failed
//!   validation but every other row is fine. Stored inside
//!   [`crate::report::IngestionReport`] so callers see which rows were
//!   skipped instead of losing the whole file to one bad line.
//!
//! Per-item store failures are a third, equally non-fatal shape:
//! [`crate::store::PersistFailure`] entries inside a successful report.

use crate::report::Suggestion;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the menu-ingest library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// No file (or a zero-length buffer) was supplied.
    #[error("No file uploaded")]
    FileMissing,

    /// MIME type or extension is not on the allow-list.
    #[error("Unsupported file '{filename}' ({mime}): only CSV and PDF files are allowed")]
    UnsupportedFormat { filename: String, mime: String },

    /// File exceeds the configured upload cap.
    #[error("File is {size} bytes, larger than the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },

    /// A local input path could not be read.
    #[error("Cannot read '{path}': {reason}")]
    FileUnreadable { path: PathBuf, reason: String },

    /// URL input could not be fetched.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// The tabular or document parser could not decode the input.
    #[error("Failed to parse file: {detail}")]
    ParseFailure { detail: String },

    /// The CSV parsed but contains no data rows.
    #[error("CSV file is empty")]
    EmptyFile,

    /// The PDF parsed but yielded no text (blank or scanned images only).
    #[error("PDF appears to be empty or contains only images. OCR processing required.")]
    EmptyOrImageOnlyDocument,

    /// Pdfium could not be loaded.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Mapping errors ────────────────────────────────────────────────────
    /// The operator-supplied mapping is not a JSON object of strings.
    #[error("Invalid mapping format. Expected JSON object: {detail}")]
    InvalidMappingFormat { detail: String },

    /// Required canonical fields could not be resolved from the headers.
    #[error("Cannot proceed: required fields are missing from CSV: {}", missing_required.join(", "))]
    MappingIncomplete {
        missing_required: Vec<String>,
        unmapped_columns: Vec<String>,
        suggestions: Vec<Suggestion>,
    },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The extraction service is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The extraction service call itself errored or timed out.
    #[error("Menu extraction failed: {message}")]
    ExtractionServiceFailure { message: String },

    /// The service answered, but not with the agreed JSON contract.
    #[error("Menu extraction returned malformed data: {detail}")]
    ExtractionSchemaViolation { detail: String },

    /// Extraction succeeded but produced zero items.
    #[error("No menu items could be extracted from the PDF (0 items from {pages} pages)")]
    NoItemsExtracted { pages: usize },

    /// Every item failed validation, so there is nothing to save.
    #[error("No valid menu items to save ({} rejected)", errors.len())]
    NoValidItems { errors: Vec<RowError> },

    // ── Item maintenance errors ───────────────────────────────────────────
    /// No item with this id belongs to the caller.
    #[error("Menu item not found")]
    ItemNotFound { id: String },

    /// An edited item failed validation.
    #[error("Invalid menu item: {}", errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; "))]
    InvalidItem { errors: Vec<RowError> },

    // ── Persistence errors ────────────────────────────────────────────────
    /// The whole batch failed for a reason unrelated to individual items.
    #[error("Failed to persist menu items: {message}")]
    PersistenceFailure { message: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// `true` when the request was rejected because of what the caller sent,
    /// `false` when processing failed on our side or in a collaborator.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            IngestError::FileMissing
                | IngestError::UnsupportedFormat { .. }
                | IngestError::FileTooLarge { .. }
                | IngestError::FileUnreadable { .. }
                | IngestError::ParseFailure { .. }
                | IngestError::EmptyFile
                | IngestError::EmptyOrImageOnlyDocument
                | IngestError::InvalidMappingFormat { .. }
                | IngestError::MappingIncomplete { .. }
                | IngestError::NoItemsExtracted { .. }
                | IngestError::NoValidItems { .. }
                | IngestError::ItemNotFound { .. }
                | IngestError::InvalidItem { .. }
        )
    }

    /// Body for JSON output. The variant's structured fields sit beside
    /// `success` and `message`.
    pub fn to_json(&self) -> Value {
        let mut body = json!({ "success": false, "message": self.to_string() });
        let detail = match self {
            IngestError::UnsupportedFormat { filename, mime } => {
                json!({ "filename": filename, "mime": mime })
            }
            IngestError::FileTooLarge { size, limit } => json!({ "size": size, "limit": limit }),
            IngestError::MappingIncomplete {
                missing_required,
                unmapped_columns,
                suggestions,
            } => json!({
                "missingRequired": missing_required,
                "unmappedColumns": unmapped_columns,
                "suggestions": suggestions,
            }),
            IngestError::NoItemsExtracted { pages } => json!({ "pages": pages, "totalItems": 0 }),
            IngestError::NoValidItems { errors } | IngestError::InvalidItem { errors } => {
                json!({ "errors": errors })
            }
            IngestError::ItemNotFound { id } => json!({ "id": id }),
            IngestError::ProviderNotConfigured { provider, .. } => json!({ "provider": provider }),
            _ => Value::Null,
        };
        if let (Value::Object(body), Value::Object(detail)) = (&mut body, detail) {
            body.extend(detail);
        }
        body
    }
}

/// A non-fatal validation error for a single row or extracted item.
///
/// `row` is the 1-based ordinal of the CSV data row, or of the item in
/// extraction order for documents.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::ParseFailure {
            detail: err.to_string(),
        }
    }
}
