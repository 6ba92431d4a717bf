//! Generation client abstraction for answering questions over retrieved context.
//!
//! The Ollama-backed client issues HTTP requests directly to the runtime,
//! mirroring the embedding adapter. Generation is optional; a harness
//! configured with provider `none` runs retrieval-only.

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider was explicitly disabled or unreachable.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Assemble the instruct-style prompt combining retrieved context with the query.
pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "You are a helpful assistant. Use the context below to answer the query posed by the user.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Query:\n\
         {query}\n"
    )
}

/// Interface implemented by generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate an answer for the fully assembled prompt.
    async fn generate_answer(&self, prompt: &str) -> Result<String, GenerationClientError>;
}

/// Generation client backed by a local Ollama runtime.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OllamaGenerationClient {
    /// Construct a client for the given runtime URL and model.
    pub fn new(base_url: String, model: String, max_tokens: u32) -> Self {
        let http = Client::builder()
            .user_agent("raglab/generate")
            .build()
            .expect("Failed to construct reqwest::Client for generation");
        Self {
            http,
            base_url,
            model,
            max_tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate_answer(&self, prompt: &str) -> Result<String, GenerationClientError> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Generating answer");

        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                // Low temperature keeps answers close to the retrieved context.
                "temperature": 0.1,
                "num_predict": self.max_tokens,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaGenerateResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

/// Build a generation client for the given configuration, when one is enabled.
pub fn generation_client(config: &Config) -> Option<Box<dyn GenerationClient>> {
    match config.generation_provider {
        GenerationProvider::None => None,
        GenerationProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            let model = config
                .generation_model
                .clone()
                .unwrap_or_else(|| "mistral".to_string());
            let max_tokens = config.generation_max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
            Some(Box::new(OllamaGenerationClient::new(
                base_url, model, max_tokens,
            )))
        }
    }
}
