/// Document ingestion
///
/// - Text extraction and admission checks for uploaded documents
/// - IngestionPipeline: chunk, embed, append to the corpus, persist once per document
pub mod extract;

pub use extract::{
    source_name, DocumentExtractor, DocumentPolicy, PdfTextExtractor, PlainTextExtractor,
    TextExtractor,
};

use crate::chunking::Chunker;
use crate::embedding::{embed_with_timeout, EmbeddingProvider};
use crate::error::{ErrorKind, RagError, Result};
use crate::storage::{Corpus, Metadata};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Embedding calls in flight per document
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// A chunk that could not be embedded and was left out of the corpus
#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub error: String,
    pub retryable: bool,
}

/// Outcome of ingesting one document
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source: String,
    pub chunks_total: usize,
    pub chunks_ingested: usize,
    pub chunks_failed: usize,
    pub failures: Vec<ChunkFailure>,
    pub duration_ms: u64,
}

impl IngestReport {
    /// True when every chunk made it into the corpus
    pub fn is_complete(&self) -> bool {
        self.chunks_failed == 0
    }
}

/// Chunks text, embeds the chunks and commits them to the shared corpus
pub struct IngestionPipeline {
    corpus: Arc<RwLock<Corpus>>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    prefix: PathBuf,
    embed_timeout: Duration,
    max_concurrent: usize,
}

impl IngestionPipeline {
    /// Create a new pipeline
    ///
    /// # Arguments
    /// * `corpus` - Shared corpus the chunks are appended to
    /// * `embedder` - Embedding provider; must match the corpus dimension
    /// * `chunker` - Word-window chunker
    /// * `prefix` - Base path of the persisted corpus artifacts
    /// * `embed_timeout` - Budget for a single embedding call
    pub fn new(
        corpus: Arc<RwLock<Corpus>>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Chunker,
        prefix: PathBuf,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            corpus,
            embedder,
            chunker,
            prefix,
            embed_timeout,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Limit the number of concurrent embedding calls (at least one)
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Ingest one document's text under `source`
    ///
    /// Chunks whose embedding fails are reported and skipped. Everything that was
    /// embedded is appended and persisted in one step; if persisting fails the
    /// in-memory corpus is rolled back to its previous state.
    pub async fn ingest(
        &self,
        text: &str,
        source: &str,
        metadata: Metadata,
    ) -> Result<IngestReport> {
        let start = Instant::now();

        let dimension = {
            let corpus = self.corpus.read().await;
            refuse_if_quarantined(&corpus)?;
            corpus.dimension()
        };

        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            warn!("{} contains no text; nothing ingested", source);
            return Ok(IngestReport {
                source: source.to_string(),
                chunks_total: 0,
                chunks_ingested: 0,
                chunks_failed: 0,
                failures: Vec::new(),
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        info!("Ingesting {} ({} chunks)", source, chunks.len());

        let (vectors, failures) = self.embed_chunks(&chunks, dimension).await?;

        let chunks_ingested = if vectors.iter().any(Option::is_some) {
            self.commit(source, &metadata, &chunks, vectors).await?
        } else {
            warn!("No chunk of {} could be embedded; corpus unchanged", source);
            0
        };

        let report = IngestReport {
            source: source.to_string(),
            chunks_total: chunks.len(),
            chunks_ingested,
            chunks_failed: failures.len(),
            failures,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Ingested {}: {} chunks added, {} failed, {}ms",
            source, report.chunks_ingested, report.chunks_failed, report.duration_ms
        );

        Ok(report)
    }

    /// Embed every chunk, returning vectors by chunk position plus per-chunk failures
    ///
    /// Failures that indicate a broken setup (wrong dimension, unusable model) abort
    /// the whole document instead of being recorded per chunk.
    async fn embed_chunks(
        &self,
        chunks: &[String],
        dimension: usize,
    ) -> Result<(Vec<Option<Vec<f32>>>, Vec<ChunkFailure>)> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for (chunk_index, text) in chunks.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let provider = Arc::clone(&self.embedder);
            let text = text.clone();
            let timeout = self.embed_timeout;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (chunk_index, embed_with_timeout(provider, text, timeout).await)
            });
        }

        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; chunks.len()];
        let mut failures = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (chunk_index, result) = joined
                .map_err(|e| RagError::Other(anyhow::anyhow!("embedding task failed: {}", e)))?;

            match result {
                Ok(vector) if vector.len() != dimension => {
                    return Err(RagError::DimensionMismatch {
                        expected: dimension,
                        actual: vector.len(),
                    });
                }
                Ok(vector) => {
                    debug!("Embedded chunk {}", chunk_index);
                    vectors[chunk_index] = Some(vector);
                }
                Err(e) if e.kind() == ErrorKind::Configuration => return Err(e),
                Err(e) => {
                    warn!("Failed to embed chunk {}: {}", chunk_index, e);
                    failures.push(ChunkFailure {
                        chunk_index,
                        retryable: e.is_retryable(),
                        error: e.to_string(),
                    });
                }
            }
        }

        failures.sort_by_key(|f| f.chunk_index);
        Ok((vectors, failures))
    }

    /// Append embedded chunks under the write lock and persist the corpus
    async fn commit(
        &self,
        source: &str,
        metadata: &Metadata,
        chunks: &[String],
        vectors: Vec<Option<Vec<f32>>>,
    ) -> Result<usize> {
        let mut corpus = self.corpus.write().await;
        refuse_if_quarantined(&corpus)?;

        let before = corpus.len();
        let mut appended = 0;

        for (chunk_index, (text, vector)) in chunks.iter().zip(vectors).enumerate() {
            let Some(vector) = vector else { continue };

            if let Err(e) = corpus.append(source, chunk_index, text, metadata.clone(), &vector) {
                corpus.rollback(before);
                if e.kind() == ErrorKind::Consistency {
                    corpus.quarantine(e.to_string());
                }
                return Err(e);
            }
            appended += 1;
        }

        if let Err(e) = corpus.save(&self.prefix) {
            error!("Failed to persist corpus after ingesting {}: {}", source, e);
            corpus.rollback(before);
            return Err(e);
        }

        Ok(appended)
    }
}

fn refuse_if_quarantined(corpus: &Corpus) -> Result<()> {
    match corpus.quarantine_reason() {
        Some(reason) => Err(RagError::CorpusQuarantined {
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
