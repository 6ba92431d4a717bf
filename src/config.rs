use serde::Deserialize;
use std::env;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the raglab harness.
///
/// Loaded once near process start and passed explicitly to the services that
/// need it; there is no global configuration cache.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Name of the default Qdrant collection.
    pub qdrant_collection_name: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Generation provider used to answer questions over retrieved context.
    pub generation_provider: GenerationProvider,
    /// Generation model identifier passed to the provider.
    pub generation_model: Option<String>,
    /// Optional cap on generated tokens (defaults applied downstream).
    pub generation_max_tokens: Option<u32>,
    /// Optional override for the local Ollama runtime URL.
    pub ollama_url: Option<String>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline embeddings (tests, air-gapped runs).
    Offline,
}

/// Supported generation backends.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Generation disabled; retrieval-only operation.
    None,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            embedding_provider: load_env("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            generation_provider: load_env_optional("GENERATION_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("GENERATION_PROVIDER".to_string()))
                })
                .transpose()?
                .unwrap_or(GenerationProvider::None),
            generation_model: load_env_optional("GENERATION_MODEL"),
            generation_max_tokens: load_env_optional("GENERATION_MAX_TOKENS")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("GENERATION_MAX_TOKENS".into()))
                })
                .transpose()?,
            ollama_url: load_env_optional("OLLAMA_URL"),
        })
    }

    /// Load `.env` (when present) and then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            qdrant_url = %config.qdrant_url,
            collection = %config.qdrant_collection_name,
            embedding_provider = ?config.embedding_provider,
            generation_provider = ?config.generation_provider,
            "Loaded configuration"
        );
        Ok(config)
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "offline" => Ok(Self::Offline),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tokens_parse_case_insensitively() {
        assert!(matches!(
            "Ollama".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Ollama)
        ));
        assert!(matches!(
            "OFFLINE".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Offline)
        ));
        assert!("openai".parse::<EmbeddingProvider>().is_err());
        assert!(matches!(
            "none".parse::<GenerationProvider>(),
            Ok(GenerationProvider::None)
        ));
    }
}
