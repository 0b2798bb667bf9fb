//! # menu-ingest
//!
//! Turn vendor menus into canonical menu items.
//!
//! Vendors send menus in whatever shape they have: a spreadsheet export with
//! their own column names, or a printed PDF. This crate accepts both and
//! produces one normalised record per menu item, validated and persisted,
//! together with a report that says exactly which rows were skipped and why.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ CSV  parse ─▶ map headers ─▶ transform rows ─┐
//!  │                                               ├─▶ validate ─▶ preview | persist ─▶ report
//!  └─ PDF  extract text ─▶ LLM extraction ─────────┘
//! ```
//!
//! * Column mapping tolerates case, whitespace and punctuation differences
//!   and a synonym dictionary; operators can override any column.
//! * Validation is per row: one bad row never rejects the file.
//! * Persistence is per item: one refused item never loses the batch.
//! * Preview mode runs everything except the write.
//! * Stored items can be edited or deleted by their owner only; edits are
//!   validated like fresh uploads.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use menu_ingest::{IngestConfig, MenuIngestor, OperatorMapping, SqliteMenuStore, UploadedFile};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteMenuStore::open("menu.db")?);
//!     let ingestor = MenuIngestor::new(IngestConfig::default(), store);
//!
//!     let csv = b"Dish,Cost,Cat\nKottu,900,Mains\n".to_vec();
//!     let file = UploadedFile::new(csv, "menu.csv", "text/csv");
//!     let report = ingestor
//!         .ingest(&file, "vendor-1", &OperatorMapping::new(), false)
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! PDF ingestion needs an LLM provider: set `OPENAI_API_KEY` (or another key
//! `edgequake-llm` recognises) or configure one on [`IngestConfig`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `menu-ingest` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder};
pub use error::{IngestError, RowError};
pub use ingest::MenuIngestor;
pub use model::{CanonicalField, CanonicalMenuItem, RawItem};
pub use pipeline::document::{DocumentTextExtractor, ExtractedText, PdfiumTextExtractor};
pub use pipeline::extract::{ExtractionService, LlmExtractionService, ServiceError};
pub use pipeline::input::{resolve_input, FileKind, UploadedFile};
pub use pipeline::mapper::{ColumnMapper, ColumnMapping, OperatorMapping};
pub use pipeline::synonyms::SynonymDictionary;
pub use report::{CsvAnalysis, IngestionReport, Suggestion, Summary};
pub use store::{
    InMemoryMenuStore, ItemFilter, MenuStore, PersistFailure, SavedMenuItem, SqliteMenuStore,
    StoreError,
};
