//! Retrieval and answer synthesis
//!
//! Embeds a question, finds the nearest chunks in the corpus and joins each hit
//! with its chunk record. The synthesizer turns retrieved chunks into a grounded
//! prompt for a text generator.

mod gemini;
mod synthesizer;

pub use gemini::GeminiGenerator;
pub use synthesizer::{
    AnswerSynthesizer, GenerationError, Generator, Synthesis, NO_DOCUMENTS_ANSWER,
};

use crate::embedding::{embed_with_timeout, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::storage::{Corpus, Metadata};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// A chunk returned for a question, with its distance to the question vector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    /// Chunk id (position in the vector index)
    pub id: u64,
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
    pub metadata: Metadata,
    /// Squared Euclidean distance; smaller is closer
    pub distance: f32,
}

impl RetrievedChunk {
    /// First `max_chars` characters of the chunk text
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &self.text[..cut]),
            None => self.text.clone(),
        }
    }
}

/// Nearest-neighbour lookup over the shared corpus
pub struct RetrievalEngine {
    corpus: Arc<RwLock<Corpus>>,
    embedder: Arc<dyn EmbeddingProvider>,
    embed_timeout: Duration,
}

impl RetrievalEngine {
    pub fn new(
        corpus: Arc<RwLock<Corpus>>,
        embedder: Arc<dyn EmbeddingProvider>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            corpus,
            embedder,
            embed_timeout,
        }
    }

    /// Up to `top_k` chunks ordered by ascending distance to `query`
    ///
    /// An empty corpus yields an empty list without calling the embedder.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Err(RagError::InvalidInput("top_k must be at least 1".to_string()));
        }
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("question is empty".to_string()));
        }

        if self.corpus.read().await.is_empty() {
            debug!("Corpus is empty, skipping retrieval");
            return Ok(Vec::new());
        }

        let vector = embed_with_timeout(
            Arc::clone(&self.embedder),
            query.to_string(),
            self.embed_timeout,
        )
        .await?;

        let corpus = self.corpus.read().await;

        if vector.len() != corpus.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: corpus.dimension(),
                actual: vector.len(),
            });
        }

        if let Err(e) = corpus.check_alignment() {
            corpus.quarantine(e.to_string());
            return Err(e);
        }

        let hits = corpus.index().search(&vector, top_k)?;
        debug!("Retrieved {} of {} chunks", hits.len(), corpus.len());

        hits.into_iter()
            .map(|hit| -> Result<RetrievedChunk> {
                let record = corpus.store().get(hit.position as u64).ok_or_else(|| {
                    let e = RagError::Consistency(format!(
                        "vector position {} has no chunk record",
                        hit.position
                    ));
                    corpus.quarantine(e.to_string());
                    e
                })?;

                Ok(RetrievedChunk {
                    id: record.id,
                    source: record.source.clone(),
                    chunk_index: record.chunk_index,
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                    distance: hit.distance,
                })
            })
            .collect()
    }
}
