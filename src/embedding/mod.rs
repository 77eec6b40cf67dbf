/// Embedding collaborators
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - OpenAiEmbedder for OpenAI-compatible HTTP endpoints ("online")
/// - FastEmbedProvider for local embedding ("offline", all-MiniLM-L6-v2, 384-dim)
/// - QueryEmbeddingCache bounding repeated query embedding work
mod cache;
mod openai;
mod provider;

pub use cache::QueryEmbeddingCache;
pub use openai::OpenAiEmbedder;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};

use crate::config::EmbeddingConfig;
use std::sync::Arc;

/// Build the provider selected by `embedding.mode`
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.mode.as_str() {
        "online" => Ok(Arc::new(OpenAiEmbedder::from_config(config)?)),
        "offline" => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
        other => Err(EmbeddingError::InitializationError(format!(
            "Unknown embedding mode: {}",
            other
        ))),
    }
}
