//! Configuration types for menu ingestion.
//!
//! All ingestion behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. The config is immutable once built and shared
//! by every request a [`crate::MenuIngestor`] serves.

use crate::error::IngestError;
use crate::pipeline::synonyms::SynonymDictionary;
use crate::pipeline::validate::DEFAULT_CURRENCY;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for menu ingestion.
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use menu_ingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .preview_limit(20)
///     .default_currency("usd")
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.default_currency, "USD");
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Upload size cap in bytes. Default: 10 MiB.
    pub max_file_size: usize,

    /// Number of valid items echoed back in preview mode. Default: 10.
    pub preview_limit: usize,

    /// Raw rows included in a CSV analysis. Default: 3.
    pub sample_rows: usize,

    /// Currency applied when a row or item has none. Default: "LKR".
    pub default_currency: String,

    /// Header spellings used for auto-mapping.
    pub synonyms: SynonymDictionary,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the environment decides.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate for one menu. Default: 8192.
    ///
    /// A multi-page menu can list a few hundred items; each item costs
    /// roughly 30 tokens of JSON.
    pub max_tokens: usize,

    /// Retries after a failed extraction call. Default: 0 (fail fast).
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for the extraction service. Default: None.
    pub api_timeout_secs: Option<u64>,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Explicit pdfium library location. Falls back to `PDFIUM_LIB_PATH`,
    /// then the system library.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            preview_limit: 10,
            sample_rows: 3,
            default_currency: DEFAULT_CURRENCY.to_string(),
            synonyms: SynonymDictionary::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: None,
            system_prompt: None,
            download_timeout_secs: 120,
            pdfium_library_path: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("max_file_size", &self.max_file_size)
            .field("preview_limit", &self.preview_limit)
            .field("sample_rows", &self.sample_rows)
            .field("default_currency", &self.default_currency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn preview_limit(mut self, n: usize) -> Self {
        self.config.preview_limit = n;
        self
    }

    pub fn sample_rows(mut self, n: usize) -> Self {
        self.config.sample_rows = n;
        self
    }

    pub fn default_currency(mut self, code: impl Into<String>) -> Self {
        self.config.default_currency = code.into().trim().to_uppercase();
        self
    }

    pub fn synonyms(mut self, dictionary: SynonymDictionary) -> Self {
        self.config.synonyms = dictionary;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.max_file_size == 0 {
            return Err(IngestError::InvalidConfig(
                "max_file_size must be ≥ 1 byte".into(),
            ));
        }
        if c.default_currency.is_empty() {
            return Err(IngestError::InvalidConfig(
                "default_currency must not be blank".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(IngestError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(IngestError::InvalidConfig(
                "api_timeout_secs must be ≥ 1 when set".into(),
            ));
        }
        Ok(self.config)
    }
}
