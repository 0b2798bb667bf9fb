//! Structured extraction: menu text in, [`RawItem`]s out.
//!
//! The external service is a black box behind [`ExtractionService`]: one
//! prompt in, one text response out. [`StructuredExtractor`] owns the
//! contract on both sides of that call: it builds the prompt and then
//! refuses anything that is not the agreed JSON array before coercing the
//! survivors into [`RawItem`]s.
//!
//! ## Retry strategy
//!
//! [`LlmExtractionService`] makes exactly one call unless
//! `max_retries` is raised. Retries back off exponentially
//! (`retry_backoff_ms * 2^(attempt-1)`); extraction is read-only, so
//! repeating a call is safe.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::RawItem;
use crate::prompts::{menu_extraction_prompt, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Failure reported by an [`ExtractionService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

/// Text-to-text structured extraction service.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

// ── LLM-backed service ───────────────────────────────────────────────────

/// One chat completion as the retry loop sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChatReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// The single provider call [`LlmExtractionService`] retries.
#[async_trait]
pub(crate) trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatReply, String>;
}

struct ProviderBackend(Arc<dyn LLMProvider>);

#[async_trait]
impl ChatBackend for ProviderBackend {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatReply, String> {
        let response = self
            .0
            .chat(messages, Some(options))
            .await
            .map_err(|e| format!("{}", e))?;
        Ok(ChatReply {
            content: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

/// [`ExtractionService`] backed by an `edgequake_llm` provider.
pub struct LlmExtractionService {
    backend: Box<dyn ChatBackend>,
    system_prompt: String,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Option<Duration>,
}

impl LlmExtractionService {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &IngestConfig) -> Self {
        Self::with_backend(Box::new(ProviderBackend(provider)), config)
    }

    pub(crate) fn with_backend(backend: Box<dyn ChatBackend>, config: &IngestConfig) -> Self {
        Self {
            backend,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            max_retries: config.max_retries.min(MAX_RETRIES),
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: config.api_timeout_secs.map(Duration::from_secs),
        }
    }

    async fn call_once(&self, messages: &[ChatMessage]) -> Result<String, String> {
        let call = self.backend.chat(messages, &self.options);
        let reply = match self.api_timeout {
            Some(limit) => timeout(limit, call)
                .await
                .map_err(|_| format!("timed out after {:?}", limit))?,
            None => call.await,
        }?;

        debug!(
            "Extraction call: {} input tokens, {} output tokens",
            reply.prompt_tokens, reply.completion_tokens
        );
        Ok(reply.content)
    }
}

/// Upper bound on retries, whatever the config says.
const MAX_RETRIES: u32 = 10;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}

#[async_trait]
impl ExtractionService for LlmExtractionService {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(prompt),
        ];

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(self.retry_backoff_ms, attempt);
                warn!(
                    "Extraction retry {}/{} after {:?}",
                    attempt, self.max_retries, backoff
                );
                sleep(backoff).await;
            }

            match self.call_once(&messages).await {
                Ok(content) => {
                    debug!("Extraction completed in {:?}", start.elapsed());
                    return Ok(content);
                }
                Err(err_msg) => {
                    warn!("Extraction attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(ServiceError(
            last_err.unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }
}

fn build_options(config: &IngestConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Structured extractor ─────────────────────────────────────────────────

/// Items recovered from one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub items: Vec<RawItem>,
    pub total_items: usize,
    pub page_count: usize,
}

/// Prompts an [`ExtractionService`] and validates what comes back.
#[derive(Clone)]
pub struct StructuredExtractor {
    service: Arc<dyn ExtractionService>,
    default_currency: String,
}

impl StructuredExtractor {
    pub fn new(service: Arc<dyn ExtractionService>, default_currency: impl Into<String>) -> Self {
        Self {
            service,
            default_currency: default_currency.into(),
        }
    }

    /// Extract menu items from document text.
    ///
    /// Exactly one service call per invocation. An empty array is a valid
    /// answer and yields an empty result; the caller decides what that means.
    pub async fn extract_items(
        &self,
        text: &str,
        page_count: usize,
    ) -> Result<ExtractionResult, IngestError> {
        let prompt = menu_extraction_prompt(text);
        debug!("Extraction prompt: {} chars from {} pages", prompt.len(), page_count);

        let response = self.service.complete(&prompt).await.map_err(|e| {
            IngestError::ExtractionServiceFailure {
                message: e.to_string(),
            }
        })?;

        let items = parse_items(&response, &self.default_currency)?;
        info!("Extracted {} menu items from {} pages", items.len(), page_count);

        Ok(ExtractionResult {
            total_items: items.len(),
            items,
            page_count,
        })
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

static RE_CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json|JSON)?[ \t]*\r?\n?").unwrap());

/// Remove every code-fence marker; models wrap JSON in them despite the prompt.
fn strip_code_fences(input: &str) -> String {
    RE_CODE_FENCE.replace_all(input, "").trim().to_string()
}

fn violation(detail: impl Into<String>) -> IngestError {
    IngestError::ExtractionSchemaViolation {
        detail: detail.into(),
    }
}

/// Parse a service response into coerced items.
///
/// Fails when the response is not JSON, not an array, holds a non-object
/// element, or an element lacks a non-empty `name` or `category`.
pub fn parse_items(response: &str, default_currency: &str) -> Result<Vec<RawItem>, IngestError> {
    let cleaned = strip_code_fences(response);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| violation(format!("response is not valid JSON: {e}")))?;

    let elements = match value {
        Value::Array(elements) => elements,
        other => {
            return Err(violation(format!(
                "expected a JSON array of items, got {}",
                json_kind(&other)
            )))
        }
    };

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let object = element
                .as_object()
                .ok_or_else(|| violation(format!("item at index {index} is not an object")))?;
            coerce_item(object, default_currency).ok_or_else(|| {
                violation(format!(
                    "item at index {index} missing required fields (name or category)"
                ))
            })
        })
        .collect()
}

fn coerce_item(object: &Map<String, Value>, default_currency: &str) -> Option<RawItem> {
    let name = text(object.get("name")).filter(|s| !s.is_empty())?;
    let category = text(object.get("category")).filter(|s| !s.is_empty())?;
    let description = text(object.get("description")).unwrap_or_default();
    let price = object.get("price").and_then(price).unwrap_or(0.0);
    let currency = text(object.get("currency"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default_currency.to_string())
        .to_uppercase();

    Some(RawItem {
        category,
        name,
        description,
        price,
        currency,
    })
}

/// Trimmed string form of a JSON value; `None` for null or absent.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string().trim().to_string()),
    }
}

fn price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|p| p.is_finite())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
