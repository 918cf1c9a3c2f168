//! Language model boundary
//!
//! Two call shapes: a plain completion returning raw text, and a structured
//! completion whose prompt carries format instructions for a declared set of
//! response fields and whose answer is parsed back into JSON.

use crate::config::LlmConfig;
use crate::error::{Result, SqlGenError};
use crate::extract::extract_code_block;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// One templated prompt in, raw completion text out.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat completions client
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SqlGenError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.0,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self::new(
            config.api_key.clone(),
            config.model.clone(),
            config.base_url.clone(),
        )?
        .with_temperature(config.temperature))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": self.temperature,
        });

        debug!("Calling {} with a {} character prompt", self.model, prompt.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SqlGenError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SqlGenError::Llm(format!(
                "LLM API returned {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| SqlGenError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| SqlGenError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

/// A field the structured completion must return.
#[derive(Debug, Clone)]
pub struct ResponseField {
    pub name: String,
    pub description: String,
    pub type_hint: String,
}

impl ResponseField {
    pub fn new(name: &str, description: &str, type_hint: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            type_hint: type_hint.to_string(),
        }
    }
}

/// Declares the response shape, renders it into the prompt and parses the
/// model's fenced JSON answer.
#[derive(Debug, Clone)]
pub struct StructuredOutputParser {
    fields: Vec<ResponseField>,
}

impl StructuredOutputParser {
    pub fn new(fields: Vec<ResponseField>) -> Self {
        Self { fields }
    }

    pub fn format_instructions(&self) -> String {
        let body = self
            .fields
            .iter()
            .map(|f| format!("\t\"{}\": {}  // {}", f.name, f.type_hint, f.description))
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "The output should be a markdown code snippet formatted in the following schema, \
             including the leading and trailing \"```json\" and \"```\":\n\n```json\n{{\n{}\n}}\n```",
            body
        )
    }

    pub fn parse(&self, response: &str) -> Result<Map<String, Value>> {
        let payload = extract_code_block(response, "json").unwrap_or_else(|_| response.trim().to_string());

        let value: Value = serde_json::from_str(&payload).map_err(|e| {
            SqlGenError::Llm(format!("Structured response is not valid JSON: {}", e))
        })?;

        let object = match value {
            Value::Object(map) => map,
            other => {
                return Err(SqlGenError::Llm(format!(
                    "Structured response is not a JSON object: {}",
                    other
                )))
            }
        };

        for field in &self.fields {
            if !object.contains_key(&field.name) {
                return Err(SqlGenError::Llm(format!(
                    "Structured response is missing field '{}'",
                    field.name
                )));
            }
        }

        Ok(object)
    }
}

/// Run one structured completion. `build_prompt` receives the format
/// instructions to embed.
pub async fn run_structured<F>(
    llm: &dyn LanguageModel,
    parser: &StructuredOutputParser,
    build_prompt: F,
) -> Result<Map<String, Value>>
where
    F: FnOnce(&str) -> String,
{
    let prompt = build_prompt(&parser.format_instructions());
    let raw = llm.complete(&prompt).await?;
    parser.parse(&raw)
}
