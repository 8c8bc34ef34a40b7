/// Embedding & Indexing
///
/// - EmbeddingProvider trait for abstraction over the "text -> vector" service
/// - FastEmbedProvider for local embedding (bge-base-en-v1.5, 768-dim)
/// - HashingEmbedder for offline, model-free embedding
/// - VectorIndex for exact nearest-neighbour search
mod provider;
mod vector_index;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashingEmbedder};
pub use vector_index::{SearchResult, VectorIndex, VectorIndexError};

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Default FastEmbed model
pub const DEFAULT_MODEL: &str = "bge-base-en-v1.5";

/// Default embedding dimension agreed at corpus creation
pub const DEFAULT_DIMENSION: usize = 768;

/// Build the provider named by the embedding configuration
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "fastembed" => Arc::new(FastEmbedProvider::new(&config.model)?),
        "hashing" => Arc::new(HashingEmbedder::new(config.dimension)?),
        other => {
            return Err(RagError::InvalidConfigValue {
                path: "embedding.provider".to_string(),
                message: format!("Unknown embedding provider '{}'", other),
            })
        }
    };

    if provider.dimension() != config.dimension {
        return Err(RagError::DimensionMismatch {
            expected: config.dimension,
            actual: provider.dimension(),
        });
    }

    Ok(provider)
}

/// Embed `text` on the blocking pool, giving up after `timeout`
///
/// A timed-out call keeps running on its blocking thread; its result is discarded.
pub async fn embed_with_timeout(
    provider: Arc<dyn EmbeddingProvider>,
    text: String,
    timeout: Duration,
) -> Result<Vec<f32>> {
    let task = tokio::task::spawn_blocking(move || provider.embed(&text));

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(RagError::Timeout {
            operation: "embedding",
            timeout,
        }),
        Ok(Err(join_error)) => Err(RagError::Embedding(EmbeddingError::GenerationError(
            format!("embedding task failed: {}", join_error),
        ))),
        Ok(Ok(result)) => Ok(result?),
    }
}
