//! LLM Boundary
//!
//! Two optional text services sit behind traits so the core never depends on a vendor:
//! - [`MetadataEnricher`]: reshapes canonical table metadata into a friendlier JSON document
//! - [`SqlGenerator`]: turns a natural-language request into a `SELECT`
//!
//! Enrichment is never required for correctness. Its failures are classified by
//! [`classify_enrichment_error`] and end in [`EnrichmentOutcome::Fallback`], never in a
//! refresh error.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::engine::TableMetadata;

mod openai;

pub use openai::OpenAiCompatClient;

/// Failure of an LLM call
#[derive(Error, Debug)]
pub enum LlmError {
    /// Non-success HTTP status from the API
    #[error("LLM API returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Network, TLS or timeout failure before a response arrived
    #[error("LLM request failed: {0}")]
    Transport(String),

    /// Response arrived but could not be used
    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),

    /// No API key or client configured
    #[error("LLM is not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// HTTP status, when the failure carried one
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Why enrichment did not produce data (internal, never surfaced as an error)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    /// Quota or account balance exhausted on the provider side
    #[error("enrichment quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Any other failure
    #[error("enrichment failed: {0}")]
    Failed(String),
}

/// Classify an enrichment failure.
///
/// Heuristic: HTTP 402, or a message mentioning "balance" (which also covers
/// "Insufficient Balance"), in any case, means the quota is exhausted.
#[must_use]
pub fn classify_enrichment_error(err: &LlmError) -> EnrichmentError {
    let message = err.to_string();
    if err.status() == Some(402) || message.to_ascii_lowercase().contains("balance") {
        EnrichmentError::QuotaExhausted(message)
    } else {
        EnrichmentError::Failed(message)
    }
}

/// Result of the optional enrichment step
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    /// Enricher produced a document
    Enriched(Value),

    /// Enricher failed; `data` is the deterministic fallback document
    Fallback { data: Value, reason: EnrichmentError },
}

impl EnrichmentOutcome {
    /// Document to persist
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Enriched(data) | Self::Fallback { data, .. } => data,
        }
    }

    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Reshapes canonical metadata into a JSON document
#[async_trait]
pub trait MetadataEnricher: Send + Sync {
    async fn enrich(&self, tables: &[TableMetadata]) -> Result<Value, LlmError>;
}

/// Generates SQL from a natural-language prompt
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// `metadata` is the persisted metadata document of the target connection
    async fn generate_sql(&self, prompt: &str, metadata: &Value, engine_id: &str) -> Result<String, LlmError>;
}

/// Stand-in used when no API key is configured: every call fails with `NotConfigured`
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledLlm;

#[async_trait]
impl MetadataEnricher for DisabledLlm {
    async fn enrich(&self, _tables: &[TableMetadata]) -> Result<Value, LlmError> {
        Err(LlmError::NotConfigured("no API key".to_string()))
    }
}

#[async_trait]
impl SqlGenerator for DisabledLlm {
    async fn generate_sql(&self, _prompt: &str, _metadata: &Value, _engine_id: &str) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured(
            "set llm.api_key or the variable named by llm.api_key_env".to_string(),
        ))
    }
}

/// Remove a surrounding Markdown code fence (```` ```sql ... ``` ````) if present
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `sql`, ...) on the opening line
    let body = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains(' ') => &rest[newline + 1..],
        _ => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
