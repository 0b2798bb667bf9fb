//! PDF text extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium keeps thread-local state and is not safe to drive from async
//! worker threads. The whole load-and-read runs on tokio's blocking pool.
//!
//! Only the embedded text layer is read. Scanned menus with no text layer
//! come back blank and the caller rejects them; there is no OCR fallback.

use crate::error::IngestError;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Text pulled out of a document, plus its page count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

impl ExtractedText {
    /// `true` when the document carried no usable text.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Source of raw document text. Swapped for a stub in tests.
#[async_trait]
pub trait DocumentTextExtractor: Send + Sync {
    async fn extract_text(&self, bytes: &[u8]) -> Result<ExtractedText, IngestError>;
}

/// [`DocumentTextExtractor`] backed by `pdfium-render`.
///
/// Binds to the library at `library_path` when given (or `PDFIUM_LIB_PATH`
/// when set), otherwise to the system-wide pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextExtractor {
    library_path: Option<PathBuf>,
}

impl PdfiumTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }
}

#[async_trait]
impl DocumentTextExtractor for PdfiumTextExtractor {
    async fn extract_text(&self, bytes: &[u8]) -> Result<ExtractedText, IngestError> {
        if !looks_like_pdf(bytes) {
            return Err(IngestError::ParseFailure {
                detail: "missing %PDF header".to_string(),
            });
        }

        let bytes = bytes.to_vec();
        let library_path = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        tokio::task::spawn_blocking(move || extract_blocking(&bytes, library_path))
            .await
            .map_err(|e| IngestError::Internal(format!("Text extraction task panicked: {}", e)))?
    }
}

/// `%PDF` magic, allowing for leading whitespace some generators emit.
fn looks_like_pdf(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"%PDF")
}

fn bind(library_path: Option<PathBuf>) -> Result<Pdfium, IngestError> {
    let bindings = match library_path {
        Some(path) => Pdfium::bind_to_library(&path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| IngestError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn extract_blocking(
    bytes: &[u8],
    library_path: Option<PathBuf>,
) -> Result<ExtractedText, IngestError> {
    let pdfium = bind(library_path)?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| IngestError::ParseFailure {
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    info!("PDF loaded: {} pages", page_count);

    let mut text = String::new();
    for (idx, page) in pages.iter().enumerate() {
        let page_text = page
            .text()
            .map_err(|e| IngestError::ParseFailure {
                detail: format!("page {}: {:?}", idx + 1, e),
            })?
            .all();
        debug!("Page {}: {} chars of text", idx + 1, page_text.len());
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&page_text);
    }

    Ok(ExtractedText { text, page_count })
}
