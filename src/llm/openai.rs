//! OpenAI-compatible HTTP provider.
//!
//! Serves both text generation (`/v1/chat/completions`) and embeddings
//! (`/v1/embeddings`). Works against OpenAI itself or any compatible
//! server (LM Studio, vLLM, Ollama's OpenAI endpoint).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::provider::{EmbeddingProvider, LanguageModelProvider};
use super::types::{ChatMessage, GenerationOverrides};
use crate::core::config::LlmConfig;
use crate::core::errors::ApiError;

const RETRY_BACKOFF_MS: u64 = 500;

#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    client: Client,
    api_key: Option<String>,
    chat_model: String,
    embedding_model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    fn resolve_api_key<'a>(&'a self, overrides: &'a GenerationOverrides) -> Result<&'a str, ApiError> {
        overrides
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .or(self.api_key.as_deref())
            .ok_or_else(|| ApiError::Provider("no API key configured for the language model".to_string()))
    }

    fn chat_body(&self, prompt: &str, overrides: &GenerationOverrides) -> Value {
        json!({
            "model": overrides.model.as_deref().unwrap_or(&self.chat_model),
            "messages": [ChatMessage::user(prompt)],
            "temperature": overrides.temperature.unwrap_or(self.temperature),
            "max_tokens": overrides.max_tokens.unwrap_or(self.max_tokens),
            "stream": false,
        })
    }

    /// POST with bounded retries on transport errors, 429 and 5xx.
    async fn post_json(&self, path: &str, api_key: &str, body: &Value) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            let outcome = self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .json(body)
                .send()
                .await;

            let failure = match outcome {
                Ok(res) if res.status().is_success() => {
                    return res.json::<Value>().await.map_err(ApiError::provider);
                }
                Ok(res) => {
                    let status = res.status();
                    let text = res.text().await.unwrap_or_default();
                    let message = format!("{} returned {}: {}", path, status, text);
                    if !is_retryable_status(status) {
                        return Err(ApiError::Provider(message));
                    }
                    message
                }
                Err(err) => format!("{} request failed: {}", path, err),
            };

            if attempt >= self.max_retries {
                return Err(ApiError::Provider(failure));
            }
            attempt += 1;
            tracing::warn!(
                "Provider call failed (attempt {}/{}), retrying: {}",
                attempt,
                self.max_retries,
                failure
            );
            tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt))).await;
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl LanguageModelProvider for OpenAiProvider {
    async fn generate(
        &self,
        prompt: &str,
        overrides: &GenerationOverrides,
    ) -> Result<String, ApiError> {
        let api_key = self.resolve_api_key(overrides)?;
        let body = self.chat_body(prompt, overrides);
        let payload = self.post_json("/v1/chat/completions", api_key, &body).await?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Provider("chat completion reply has no content".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Provider("no API key configured for embeddings".to_string()))?;
        let body = json!({
            "model": self.embedding_model,
            "input": text,
        });
        let payload = self.post_json("/v1/embeddings", api_key, &body).await?;

        let values = payload["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| ApiError::Provider("embedding reply has no vector".to_string()))?;

        Ok(values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect())
    }
}
