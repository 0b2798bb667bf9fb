//! The ingestion entry points.
//!
//! [`MenuIngestor`] runs one self-contained pipeline per request:
//!
//! ```text
//! Received ─▶ Parsed ─▶ Mapped ─▶ Transformed ─▶ Validated ─┬▶ PreviewReported
//!    (CSV)                                                  └▶ Persisted ─▶ Reported
//! Received ─▶ TextExtracted ─▶ ItemsExtracted ─▶ Validated ─┘
//!    (PDF)
//! ```
//!
//! Any stage may exit early with an [`IngestError`]. Row-level problems never
//! do; they end up in the report. The ingestor holds only configuration and
//! shared handles, so one instance can serve concurrent requests.

use crate::config::IngestConfig;
use crate::error::{IngestError, RowError};
use crate::model::{CanonicalField, CanonicalMenuItem};
use crate::pipeline::document::{DocumentTextExtractor, PdfiumTextExtractor};
use crate::pipeline::extract::{ExtractionService, LlmExtractionService, StructuredExtractor};
use crate::pipeline::input::{FileKind, UploadedFile};
use crate::pipeline::mapper::{ColumnMapper, OperatorMapping};
use crate::pipeline::persist::PersistenceCoordinator;
use crate::pipeline::suggest::suggest;
use crate::pipeline::tabular::parse_csv;
use crate::pipeline::transform::transform_rows;
use crate::pipeline::validate::{ItemFields, ItemValidator};
use crate::report::{saved_message, CsvAnalysis, IngestionReport, MappingSummary, SampleRow};
use crate::store::{ItemFilter, MenuStore, SavedMenuItem, StoreError};
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

const CSV_PREVIEW_MESSAGE: &str = "CSV preview completed successfully";
const CSV_UPLOAD_MESSAGE: &str = "Menu upload completed";
const PDF_PREVIEW_MESSAGE: &str = "PDF menu extracted successfully. Review the items below.";

/// Runs menu ingestion requests against one store.
pub struct MenuIngestor {
    config: IngestConfig,
    mapper: ColumnMapper,
    validator: ItemValidator,
    store: Arc<dyn MenuStore>,
    persistence: PersistenceCoordinator,
    text_extractor: Arc<dyn DocumentTextExtractor>,
    service: Option<Arc<dyn ExtractionService>>,
}

impl MenuIngestor {
    /// Ingestor with the pdfium text extractor. The extraction service is
    /// resolved from `config` the first time a document needs it.
    pub fn new(config: IngestConfig, store: Arc<dyn MenuStore>) -> Self {
        let text_extractor: Arc<dyn DocumentTextExtractor> = match &config.pdfium_library_path {
            Some(path) => Arc::new(PdfiumTextExtractor::with_library_path(path.clone())),
            None => Arc::new(PdfiumTextExtractor::new()),
        };
        Self {
            mapper: ColumnMapper::new(config.synonyms.clone()),
            validator: ItemValidator::new(config.default_currency.clone()),
            persistence: PersistenceCoordinator::new(Arc::clone(&store)),
            store,
            text_extractor,
            service: None,
            config,
        }
    }

    /// Use `service` instead of resolving an LLM provider.
    pub fn with_extraction_service(mut self, service: Arc<dyn ExtractionService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Use `extractor` instead of pdfium.
    pub fn with_text_extractor(mut self, extractor: Arc<dyn DocumentTextExtractor>) -> Self {
        self.text_extractor = extractor;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    // ── Tabular path ──────────────────────────────────────────────────────

    /// Analyse a CSV without ingesting it: detected columns, the automatic
    /// mapping, what is missing and a few sample rows.
    pub async fn analyze_csv(&self, file: &UploadedFile) -> Result<CsvAnalysis, IngestError> {
        self.expect_kind(file, FileKind::Csv)?;
        let table = parse_csv(&file.bytes)?;
        if table.is_empty() {
            return Err(IngestError::EmptyFile);
        }

        let result = self.mapper.map_headers(&table.headers, &OperatorMapping::new());
        let suggestions = suggest(&result.unmapped_columns);
        let sample_data = table
            .rows
            .iter()
            .take(self.config.sample_rows)
            .map(|row| SampleRow(row.cells.clone()))
            .collect();

        info!(
            "Analysed '{}': {} rows, {} columns, ready={}",
            file.filename,
            table.rows.len(),
            table.headers.len(),
            result.is_complete()
        );

        Ok(CsvAnalysis {
            total_rows: table.rows.len(),
            columns: table.headers.len(),
            ready_to_upload: result.is_complete(),
            detected_columns: table.headers,
            auto_mapping: result.mapping,
            unmapped_columns: result.unmapped_columns,
            missing_required_fields: result.missing_required,
            suggestions,
            sample_data,
        })
    }

    /// Ingest a CSV. `mapping` overrides automatic column detection; with
    /// `preview` nothing is written.
    pub async fn ingest_csv(
        &self,
        file: &UploadedFile,
        owner_id: &str,
        mapping: &OperatorMapping,
        preview: bool,
    ) -> Result<IngestionReport, IngestError> {
        let start = Instant::now();
        info!("Ingesting CSV '{}' for {} (preview={})", file.filename, owner_id, preview);
        self.expect_kind(file, FileKind::Csv)?;

        let table = parse_csv(&file.bytes)?;
        if table.is_empty() {
            return Err(IngestError::EmptyFile);
        }
        debug!("Parsed: {} rows", table.rows.len());

        let result = self.mapper.map_headers(&table.headers, mapping);
        if !result.is_complete() {
            warn!("Mapping incomplete, missing {:?}", result.missing_required);
            return Err(IngestError::MappingIncomplete {
                missing_required: result.missing_required_names(),
                suggestions: suggest(&result.unmapped_columns),
                unmapped_columns: result.unmapped_columns,
            });
        }
        debug!("Mapped: {} columns", result.mapping.len());

        let mapped = transform_rows(&table.rows, &result.mapping);
        debug!("Transformed: {} rows", mapped.len());

        let (valid, errors) =
            self.validate_all(mapped.iter().map(|row| (row.ordinal, row)), owner_id);

        let message = if preview {
            CSV_PREVIEW_MESSAGE
        } else {
            CSV_UPLOAD_MESSAGE
        };
        let mut report = IngestionReport::new(preview, message);
        report.mapping = Some(MappingSummary {
            applied: result.mapping,
            unmapped_columns: result.unmapped_columns,
        });
        report.summary.total_rows = mapped.len();
        report.summary.skipped_rows = mapped.len() - valid.len();
        report.errors = errors;

        self.finish(&mut report, valid, preview).await?;
        info!(
            "CSV '{}': {} saved, {} skipped in {:?}",
            file.filename,
            report.summary.saved_rows,
            report.summary.skipped_rows,
            start.elapsed()
        );
        Ok(report)
    }

    // ── Document path ─────────────────────────────────────────────────────

    /// Ingest a PDF menu through text extraction and the extraction service.
    pub async fn ingest_pdf(
        &self,
        file: &UploadedFile,
        owner_id: &str,
        preview: bool,
    ) -> Result<IngestionReport, IngestError> {
        let start = Instant::now();
        info!("Ingesting PDF '{}' for {} (preview={})", file.filename, owner_id, preview);
        self.expect_kind(file, FileKind::Pdf)?;

        let text = self.text_extractor.extract_text(&file.bytes).await?;
        if text.is_blank() {
            return Err(IngestError::EmptyOrImageOnlyDocument);
        }
        debug!("Text extracted: {} chars, {} pages", text.text.len(), text.page_count);

        let extractor = self.structured_extractor().await?;
        let extraction = extractor.extract_items(&text.text, text.page_count).await?;
        if extraction.total_items == 0 {
            return Err(IngestError::NoItemsExtracted {
                pages: extraction.page_count,
            });
        }
        debug!("Items extracted: {}", extraction.total_items);

        let (valid, errors) = self.validate_all(
            extraction.items.iter().enumerate().map(|(i, item)| (i + 1, item)),
            owner_id,
        );

        if !preview && valid.is_empty() {
            return Err(IngestError::NoValidItems { errors });
        }

        let mut report = IngestionReport::new(preview, PDF_PREVIEW_MESSAGE);
        report.filename = Some(file.filename.clone());
        report.pages = Some(extraction.page_count);
        report.summary.total_rows = extraction.total_items;
        report.summary.skipped_rows = extraction.total_items - valid.len();
        report.errors = errors;

        self.finish(&mut report, valid, preview).await?;
        info!(
            "PDF '{}': {} items, {} saved in {:?}",
            file.filename,
            extraction.total_items,
            report.summary.saved_rows,
            start.elapsed()
        );
        Ok(report)
    }

    /// Persist items an operator reviewed (and possibly edited) after a
    /// document preview. Each element must be a JSON object keyed by
    /// canonical field name; everything goes through the same validation as
    /// freshly extracted items.
    pub async fn save_reviewed_items(
        &self,
        items: &[Value],
        owner_id: &str,
    ) -> Result<IngestionReport, IngestError> {
        info!("Saving {} reviewed items for {}", items.len(), owner_id);

        let mut valid = Vec::new();
        let mut errors = Vec::new();
        for (index, value) in items.iter().enumerate() {
            let ordinal = index + 1;
            match value.as_object() {
                Some(object) => match self.validate_one(object, ordinal, owner_id) {
                    Ok(item) => valid.push(item),
                    Err(mut row_errors) => errors.append(&mut row_errors),
                },
                None => errors.push(RowError::new(
                    ordinal,
                    format!("Row {ordinal}: Item must be a JSON object"),
                )),
            }
        }

        if valid.is_empty() {
            return Err(IngestError::NoValidItems { errors });
        }

        let mut report = IngestionReport::new(false, String::new());
        report.summary.total_rows = items.len();
        report.summary.skipped_rows = items.len() - valid.len();
        report.errors = errors;
        self.finish(&mut report, valid, false).await?;
        Ok(report)
    }

    // ── Dispatch and reads ────────────────────────────────────────────────

    /// Ingest any allowed upload, picking the path from its type.
    /// `mapping` only applies to CSV files.
    pub async fn ingest(
        &self,
        file: &UploadedFile,
        owner_id: &str,
        mapping: &OperatorMapping,
        preview: bool,
    ) -> Result<IngestionReport, IngestError> {
        match file.classify(self.config.max_file_size)? {
            FileKind::Csv => self.ingest_csv(file, owner_id, mapping, preview).await,
            FileKind::Pdf => self.ingest_pdf(file, owner_id, preview).await,
        }
    }

    /// Stored items for `owner_id`, sorted by category then name.
    pub async fn list_items(
        &self,
        owner_id: &str,
        filter: &ItemFilter,
    ) -> Result<Vec<SavedMenuItem>, IngestError> {
        self.store
            .list(owner_id, filter)
            .await
            .map_err(|e| IngestError::PersistenceFailure {
                message: e.to_string(),
            })
    }

    // ── Item maintenance ──────────────────────────────────────────────────

    /// Apply a partial edit to one stored item. `patch` is a JSON object
    /// keyed by canonical field name; absent fields keep their stored value.
    /// The merged item is validated like any other before it is written.
    pub async fn update_item(
        &self,
        owner_id: &str,
        id: &str,
        patch: &Value,
    ) -> Result<SavedMenuItem, IngestError> {
        let patch = patch.as_object().ok_or_else(|| IngestError::InvalidItem {
            errors: vec![RowError::new(1, "Update must be a JSON object")],
        })?;

        let existing = self
            .store
            .find(owner_id, id)
            .await
            .map_err(|e| store_failure(e, id))?
            .ok_or_else(|| IngestError::ItemNotFound { id: id.to_string() })?;

        let mut merged = match serde_json::to_value(&existing.item) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => return Err(IngestError::Internal("menu item is not a JSON object".into())),
            Err(e) => return Err(IngestError::Internal(e.to_string())),
        };
        for field in CanonicalField::ALL {
            if let Some(value) = patch.get(field.as_str()) {
                merged.insert(field.as_str().to_string(), value.clone());
            }
        }

        let item = self
            .validate_one(&merged, 1, owner_id)
            .map_err(|errors| IngestError::InvalidItem { errors })?;
        let updated = self
            .store
            .update(owner_id, id, &item)
            .await
            .map_err(|e| store_failure(e, id))?;
        info!("Updated menu item {} for {}", id, owner_id);
        Ok(updated)
    }

    /// Remove one stored item belonging to `owner_id`.
    pub async fn delete_item(&self, owner_id: &str, id: &str) -> Result<(), IngestError> {
        self.store
            .delete(owner_id, id)
            .await
            .map_err(|e| store_failure(e, id))?;
        info!("Deleted menu item {} for {}", id, owner_id);
        Ok(())
    }

    // ── Internal helpers ──────────────────────────────────────────────────

    fn expect_kind(&self, file: &UploadedFile, expected: FileKind) -> Result<(), IngestError> {
        let kind = file.classify(self.config.max_file_size)?;
        if kind != expected {
            return Err(IngestError::UnsupportedFormat {
                filename: file.filename.clone(),
                mime: file.mime.clone(),
            });
        }
        Ok(())
    }

    fn validate_one<T: ItemFields + ?Sized>(
        &self,
        input: &T,
        ordinal: usize,
        owner_id: &str,
    ) -> Result<CanonicalMenuItem, Vec<RowError>> {
        self.validator.validate(input, ordinal).into_item(owner_id)
    }

    fn validate_all<'a, T, I>(&self, inputs: I, owner_id: &str) -> (Vec<CanonicalMenuItem>, Vec<RowError>)
    where
        T: ItemFields + 'a,
        I: Iterator<Item = (usize, &'a T)>,
    {
        let mut valid = Vec::new();
        let mut errors = Vec::new();
        for (ordinal, input) in inputs {
            match self.validate_one(input, ordinal, owner_id) {
                Ok(item) => valid.push(item),
                Err(mut row_errors) => {
                    for e in &row_errors {
                        warn!("Skipping: {}", e);
                    }
                    errors.append(&mut row_errors);
                }
            }
        }
        debug!("Validated: {} valid, {} errors", valid.len(), errors.len());
        (valid, errors)
    }

    /// Either attach preview data or persist, then fill in the counters.
    async fn finish(
        &self,
        report: &mut IngestionReport,
        valid: Vec<CanonicalMenuItem>,
        preview: bool,
    ) -> Result<(), IngestError> {
        report.summary.valid_rows = valid.len();

        if preview {
            report.preview_data = Some(
                valid
                    .into_iter()
                    .take(self.config.preview_limit)
                    .collect(),
            );
            debug!("PreviewReported");
            return Ok(());
        }

        let outcome = self.persistence.persist(&valid).await?;
        report.summary.saved_rows = outcome.saved_count();
        report.saved_ids = outcome.saved.iter().map(|s| s.id.clone()).collect();
        report.failures = outcome.failures;
        debug!("Persisted: {} of {}", report.summary.saved_rows, valid.len());

        // Documents and reviewed items report how the save went; CSV keeps
        // its fixed message.
        if report.message != CSV_UPLOAD_MESSAGE {
            report.message = saved_message(report.summary.saved_rows, valid.len());
        }
        Ok(())
    }

    async fn structured_extractor(&self) -> Result<StructuredExtractor, IngestError> {
        let service = match &self.service {
            Some(service) => Arc::clone(service),
            None => {
                let provider = resolve_provider(&self.config).await?;
                Arc::new(LlmExtractionService::new(provider, &self.config))
            }
        };
        Ok(StructuredExtractor::new(
            service,
            self.validator.default_currency(),
        ))
    }
}

fn store_failure(err: StoreError, id: &str) -> IngestError {
    match err {
        StoreError::NotFound(_) => IngestError::ItemNotFound { id: id.to_string() },
        other => IngestError::PersistenceFailure {
            message: other.to_string(),
        },
    }
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, IngestError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        IngestError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
async fn resolve_provider(config: &IngestConfig) -> Result<Arc<dyn LLMProvider>, IngestError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| IngestError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
