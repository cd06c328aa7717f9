//! OpenAI-compatible chat completions client (DeepSeek by default)

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{strip_code_fence, LlmError, MetadataEnricher, SqlGenerator};
use crate::config::LlmConfig;
use crate::engine::{TableMetadata, ENGINE_MYSQL};

const ENRICH_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that converts database metadata into structured JSON format.";

const ENRICH_FORMAT: &str = r#"{
  "tables": [
    {
      "name": "schema.table_name",
      "type": "table" or "view",
      "columns": [
        {
          "name": "column_name",
          "type": "data_type",
          "nullable": true/false,
          "default": "default_value" or null
        }
      ]
    }
  ]
}"#;

/// Client for `POST {base_url}/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("Could not build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Client for the configured provider, or `None` when no API key is available
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, LlmError> {
        let Some(api_key) = config.resolve_api_key() else {
            return Ok(None);
        };
        Self::new(&config.base_url, &config.model, api_key, Duration::from_millis(config.timeout_ms))
            .map(Some)
    }

    /// One chat round trip; returns the first choice's message content
    async fn chat(&self, system: &str, user: &str, temperature: f32) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": temperature
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(http_error(status.as_u16(), &text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("response is not JSON: {e}")))?;
        extract_content(&body)
    }
}

/// Error for a non-success status; the body need not be JSON
fn http_error(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(ToString::to_string))
        .unwrap_or_else(|| {
            let text = body.trim();
            if text.is_empty() { "Unknown error".to_string() } else { text.to_string() }
        });
    LlmError::Http { status, message }
}

fn extract_content(body: &Value) -> Result<String, LlmError> {
    body["choices"]
        .as_array()
        .and_then(|choices| choices.first())
        .and_then(|choice| choice["message"]["content"].as_str())
        .map(ToString::to_string)
        .ok_or_else(|| LlmError::InvalidResponse("no message content in choices".to_string()))
}

fn engine_display_name(engine_id: &str) -> &'static str {
    if engine_id.eq_ignore_ascii_case(ENGINE_MYSQL) {
        "MySQL"
    } else {
        "PostgreSQL"
    }
}

#[async_trait]
impl MetadataEnricher for OpenAiCompatClient {
    async fn enrich(&self, tables: &[TableMetadata]) -> Result<Value, LlmError> {
        let raw = serde_json::to_string_pretty(tables)
            .map_err(|e| LlmError::InvalidResponse(format!("could not serialize metadata: {e}")))?;

        let prompt = format!(
            "Convert the following database metadata into a structured JSON format.\n\
             The metadata contains information about tables and views.\n\n\
             Raw metadata:\n{raw}\n\n\
             Please convert this into a clean JSON structure with the following format:\n\
             {ENRICH_FORMAT}\n\n\
             Return only the JSON, no additional text."
        );

        let content = self.chat(ENRICH_SYSTEM_PROMPT, &prompt, 0.1).await?;
        serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| LlmError::InvalidResponse(format!("enriched metadata is not JSON: {e}")))
    }
}

#[async_trait]
impl SqlGenerator for OpenAiCompatClient {
    async fn generate_sql(&self, prompt: &str, metadata: &Value, engine_id: &str) -> Result<String, LlmError> {
        let db_name = engine_display_name(engine_id);
        let schema = serde_json::to_string_pretty(metadata)
            .map_err(|e| LlmError::InvalidResponse(format!("could not serialize metadata: {e}")))?;

        let system = format!(
            "You are a SQL query generator. You generate {db_name} SELECT queries based on \
             natural language descriptions.\n\n\
             Rules:\n\
             1. Only generate SELECT statements\n\
             2. Do not include LIMIT clauses (they will be added automatically)\n\
             3. Use proper {db_name} syntax\n\
             4. Reference tables and columns from the provided schema\n\
             5. Return only the SQL query, no explanations"
        );
        let user = format!(
            "Database Schema:\n{schema}\n\nUser Query: {prompt}\n\n\
             Generate a {db_name} SELECT query for the above request. Return only the SQL query."
        );

        let content = self.chat(&system, &user, 0.3).await?;
        let sql = strip_code_fence(&content);
        if sql.is_empty() {
            return Err(LlmError::InvalidResponse("empty SQL in response".to_string()));
        }
        Ok(sql.to_string())
    }
}
