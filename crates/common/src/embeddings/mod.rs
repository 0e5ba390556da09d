//! Embedding service abstraction
//!
//! Provides a unified interface for the embedding providers used by
//! Catalyst Explorer:
//! - Ollama (nomic-embed-text), the default for self-hosted deployments
//! - OpenAI (text-embedding-3-small, text-embedding-3-large, ada-002)
//! - A deterministic mock for tests and local runs
//!
//! plus the idempotent generate-and-store service on top of them.

mod mock;
mod ollama;
mod openai;
mod service;

pub use mock::MockEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAIEmbedder;
pub use service::{
    content_hash, estimate_token_count, BatchItem, BatchReport, EmbeddingOutcome,
    EmbeddingService, EmbeddingStore, EmbeddingTarget,
};

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Provider identifier stored with each embedding
    fn provider_name(&self) -> &str;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let timeout = Duration::from_secs(config.timeout_secs);

    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(
            config.model.clone(),
            config.api_base.clone(),
            config.dimension,
            timeout,
        )?)),
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "OpenAI API key not configured".to_string(),
            })?;
            Ok(Arc::new(OpenAIEmbedder::new(
                key,
                config.model.clone(),
                config.api_base.clone(),
                config.max_retries,
                timeout,
            )?))
        }
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => Err(AppError::UnsupportedProvider {
            provider: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_embedder() {
        let config = EmbeddingConfig {
            provider: "mock".to_string(),
            dimension: 16,
            ..Default::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.provider_name(), "mock");
        assert_eq!(embedder.dimension(), 16);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "cohere".to_string(),
            ..Default::default()
        };
        let err = create_embedder(&config).err().unwrap();
        assert!(matches!(err, AppError::UnsupportedProvider { ref provider } if provider == "cohere"));
    }

    #[test]
    fn test_openai_requires_key() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            api_key: None,
            ..Default::default()
        };
        let err = create_embedder(&config).err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
