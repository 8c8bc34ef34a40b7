//! Document-grounded question answering over a persisted corpus
//!
//! `RagEngine` wires the ingestion pipeline, the retrieval engine and the answer
//! synthesizer around one shared [`Corpus`]. Writers serialize on the corpus write
//! lock; questions run concurrently under the read lock.

use crate::chunking::{Chunker, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::config::Config;
use crate::embedding::{provider_from_config, EmbeddingProvider};
use crate::error::{ErrorKind, RagError, Result};
use crate::ingestion::{
    source_name, DocumentExtractor, DocumentPolicy, IngestReport, IngestionPipeline,
    TextExtractor, DEFAULT_MAX_CONCURRENT,
};
use crate::retrieval::{
    AnswerSynthesizer, GeminiGenerator, Generator, RetrievalEngine, RetrievedChunk, Synthesis,
    NO_DOCUMENTS_ANSWER,
};
use crate::storage::{Corpus, Metadata};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Default number of chunks retrieved per question
pub const DEFAULT_TOP_K: usize = 3;

/// Resolved engine parameters
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Base path of the `.index` / `.store` artifact pair
    pub corpus_prefix: PathBuf,
    pub dimension: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    pub embed_timeout: Duration,
    /// Embedding calls in flight per document
    pub max_concurrent_embeds: usize,
    pub generate_timeout: Duration,
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
    pub default_top_k: usize,
}

impl EngineSettings {
    /// Defaults for a corpus at `corpus_prefix` holding `dimension`-float vectors
    pub fn new(corpus_prefix: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            corpus_prefix: corpus_prefix.into(),
            dimension,
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            embed_timeout: Duration::from_secs(30),
            max_concurrent_embeds: DEFAULT_MAX_CONCURRENT,
            generate_timeout: Duration::from_secs(60),
            max_file_size: 16 * 1024 * 1024,
            allowed_extensions: vec!["pdf".to_string(), "txt".to_string(), "md".to_string()],
            default_top_k: DEFAULT_TOP_K,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            corpus_prefix: config.corpus_prefix()?,
            dimension: config.embedding.dimension,
            chunk_size: config.ingestion.chunk_size,
            overlap: config.ingestion.overlap,
            embed_timeout: config.embedding_timeout()?,
            max_concurrent_embeds: config.embedding.max_concurrent,
            generate_timeout: config.llm_timeout()?,
            max_file_size: config.max_file_size_bytes()?,
            allowed_extensions: config.ingestion.allowed_extensions.clone(),
            default_top_k: config.retrieval.top_k,
        })
    }
}

/// How a question was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// The generator produced an answer grounded in the retrieved chunks
    Answered,
    /// The corpus was empty when retrieval ran; nothing was retrieved or generated
    NoDocuments,
    /// Generation failed or is disabled; the retrieved chunks are still returned
    GenerationFailed,
}

/// Answer to a question together with the evidence it was built from
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub status: AnswerStatus,
    pub answer: String,
    /// Distinct sources of the retrieved chunks, closest first
    pub sources: Vec<String>,
    pub retrieved_chunks: Vec<RetrievedChunk>,
}

/// Snapshot of the corpus
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub corpus_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub chunks: usize,
    pub sources: Vec<String>,
    pub dimension: usize,
    pub quarantined: Option<String>,
}

/// Outcome of one document in a batch
#[derive(Debug)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    pub result: Result<IngestReport>,
}

/// Why a batch ended before its last document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStop {
    /// The cancel flag was raised between documents
    Cancelled,
    /// A document hit an error that would fail every later document too
    Fatal,
}

/// Per-document outcomes of a batch ingestion
#[derive(Debug, Default)]
pub struct BatchReport {
    pub documents: Vec<DocumentOutcome>,
    pub stopped: Option<BatchStop>,
}

impl BatchReport {
    pub fn chunks_ingested(&self) -> usize {
        self.reports().map(|r| r.chunks_ingested).sum()
    }

    pub fn chunks_failed(&self) -> usize {
        self.reports().map(|r| r.chunks_failed).sum()
    }

    /// Documents that failed as a whole
    pub fn failed_documents(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.documents.iter().filter(|d| d.result.is_err())
    }

    fn reports(&self) -> impl Iterator<Item = &IngestReport> {
        self.documents.iter().filter_map(|d| d.result.as_ref().ok())
    }
}

/// Ingestion and question answering over one corpus
pub struct RagEngine {
    settings: EngineSettings,
    corpus: Arc<RwLock<Corpus>>,
    pipeline: IngestionPipeline,
    retrieval: RetrievalEngine,
    synthesizer: AnswerSynthesizer,
    extractor: Arc<dyn TextExtractor>,
    policy: DocumentPolicy,
}

impl RagEngine {
    /// Open (or start) the corpus at `settings.corpus_prefix`
    ///
    /// # Arguments
    /// * `settings` - Resolved engine parameters
    /// * `embedder` - Must produce `settings.dimension`-float vectors
    /// * `generator` - Text generator; `None` answers with retrieved excerpts only
    /// * `extractor` - Document to text conversion
    pub fn new(
        settings: EngineSettings,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Option<Arc<dyn Generator>>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self> {
        if embedder.dimension() != settings.dimension {
            return Err(RagError::DimensionMismatch {
                expected: settings.dimension,
                actual: embedder.dimension(),
            });
        }

        let chunker = Chunker::new(settings.chunk_size, settings.overlap)?;
        let corpus = Arc::new(RwLock::new(Corpus::open(
            &settings.corpus_prefix,
            settings.dimension,
        )?));

        let pipeline = IngestionPipeline::new(
            Arc::clone(&corpus),
            Arc::clone(&embedder),
            chunker,
            settings.corpus_prefix.clone(),
            settings.embed_timeout,
        )
        .with_max_concurrent(settings.max_concurrent_embeds);
        let retrieval = RetrievalEngine::new(
            Arc::clone(&corpus),
            Arc::clone(&embedder),
            settings.embed_timeout,
        );
        let synthesizer = match generator {
            Some(generator) => AnswerSynthesizer::new(generator, settings.generate_timeout),
            None => AnswerSynthesizer::offline(),
        };
        let policy = DocumentPolicy::new(&settings.allowed_extensions, settings.max_file_size);

        info!(
            "Engine ready: corpus {} with {} chunks ({}, generation {})",
            settings.corpus_prefix.display(),
            corpus.try_read().map(|c| c.len()).unwrap_or_default(),
            embedder.model_name(),
            if synthesizer.is_offline() { "off" } else { "on" }
        );

        Ok(Self {
            settings,
            corpus,
            pipeline,
            retrieval,
            synthesizer,
            extractor,
            policy,
        })
    }

    /// Build the engine described by `config`
    ///
    /// `offline` disables generation regardless of `llm.enabled`.
    pub fn from_config(config: &Config, offline: bool) -> Result<Self> {
        let settings = EngineSettings::from_config(config)?;
        let embedder = provider_from_config(&config.embedding)?;

        let generator: Option<Arc<dyn Generator>> = if offline || !config.llm.enabled {
            None
        } else {
            Some(Arc::new(GeminiGenerator::from_config(
                &config.llm,
                settings.generate_timeout,
            )?))
        };

        Self::new(
            settings,
            embedder,
            generator,
            Arc::new(DocumentExtractor::default()),
        )
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Extract, chunk, embed and persist one document file
    pub async fn ingest_document(
        &self,
        path: &Path,
        metadata: Option<Metadata>,
    ) -> Result<IngestReport> {
        self.policy.check(path)?;
        let source = source_name(path)?;

        let extractor = Arc::clone(&self.extractor);
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extractor.extract_text(&owned))
            .await
            .map_err(|e| RagError::DocumentUnreadable {
                path: path.to_path_buf(),
                reason: format!("extraction task failed: {}", e),
            })??;

        self.pipeline
            .ingest(&text, &source, metadata.unwrap_or_default())
            .await
    }

    /// Ingest already-extracted text under `source`
    pub async fn ingest_text(
        &self,
        text: &str,
        source: &str,
        metadata: Option<Metadata>,
    ) -> Result<IngestReport> {
        if source.trim().is_empty() {
            return Err(RagError::InvalidInput("source name is empty".to_string()));
        }
        self.pipeline
            .ingest(text, source, metadata.unwrap_or_default())
            .await
    }

    /// Ingest every admissible file directly inside `dir`, in file-name order
    pub async fn ingest_directory(
        &self,
        dir: &Path,
        metadata: Option<Metadata>,
        cancel: &AtomicBool,
    ) -> Result<BatchReport> {
        let files = self.admissible_files(dir)?;
        info!("Found {} documents in {}", files.len(), dir.display());
        Ok(self.ingest_batch(files, metadata, cancel).await)
    }

    /// Ingest a mix of files and directories; directories expand to their admissible files
    pub async fn ingest_paths(
        &self,
        paths: &[PathBuf],
        metadata: Option<Metadata>,
        cancel: &AtomicBool,
    ) -> Result<BatchReport> {
        let mut files = Vec::new();
        for path in paths {
            if path.is_dir() {
                files.extend(self.admissible_files(path)?);
            } else {
                files.push(path.clone());
            }
        }
        Ok(self.ingest_batch(files, metadata, cancel).await)
    }

    async fn ingest_batch(
        &self,
        files: Vec<PathBuf>,
        metadata: Option<Metadata>,
        cancel: &AtomicBool,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for path in files {
            if cancel.load(Ordering::SeqCst) {
                warn!(
                    "Ingestion cancelled after {} documents",
                    report.documents.len()
                );
                report.stopped = Some(BatchStop::Cancelled);
                break;
            }

            let result = self.ingest_document(&path, metadata.clone()).await;
            let fatal = match &result {
                Err(e) => {
                    warn!("Failed to ingest {}: {}", path.display(), e);
                    matches!(
                        e.kind(),
                        ErrorKind::Configuration | ErrorKind::Consistency | ErrorKind::Storage
                    )
                }
                Ok(_) => false,
            };

            report.documents.push(DocumentOutcome { path, result });

            if fatal {
                report.stopped = Some(BatchStop::Fatal);
                break;
            }
        }

        info!(
            "Batch complete: {} documents, {} chunks ingested, {} chunks failed",
            report.documents.len(),
            report.chunks_ingested(),
            report.chunks_failed()
        );
        report
    }

    fn admissible_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(dir).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read directory: {}", dir.display()),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RagError::Io {
                source: e,
                context: format!("Failed to read directory entry in {}", dir.display()),
            })?;
            let path = entry.path();
            if path.is_file() && self.policy.allows_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Up to `top_k` chunks closest to `question`
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        self.retrieval.retrieve(question, top_k).await
    }

    /// Answer `question` from the `top_k` closest chunks
    ///
    /// The generator is only called when at least one chunk was retrieved.
    pub async fn ask(&self, question: &str, top_k: usize) -> Result<AskResponse> {
        let chunks = self.retrieval.retrieve(question, top_k).await?;

        // top_k >= 1 is enforced by retrieval, so an empty result means an empty corpus
        if chunks.is_empty() {
            return Ok(AskResponse {
                status: AnswerStatus::NoDocuments,
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                sources: Vec::new(),
                retrieved_chunks: Vec::new(),
            });
        }

        let mut sources: Vec<String> = Vec::new();
        for chunk in &chunks {
            if !sources.contains(&chunk.source) {
                sources.push(chunk.source.clone());
            }
        }

        let (status, answer) = match self.synthesizer.synthesize(question, &chunks).await {
            Synthesis::Answer(text) => (AnswerStatus::Answered, text),
            Synthesis::Error { reason, .. } => (
                AnswerStatus::GenerationFailed,
                format!(
                    "Could not generate an answer ({}). The {} most relevant excerpts are attached.",
                    reason,
                    chunks.len()
                ),
            ),
        };

        Ok(AskResponse {
            status,
            answer,
            sources,
            retrieved_chunks: chunks,
        })
    }

    /// Number of chunks in the corpus
    pub async fn corpus_size(&self) -> usize {
        self.corpus.read().await.len()
    }

    pub async fn stats(&self) -> CorpusStats {
        let corpus = self.corpus.read().await;
        CorpusStats {
            corpus_id: corpus.id(),
            created_at: corpus.created_at(),
            chunks: corpus.len(),
            sources: corpus.store().all_sources().into_iter().collect(),
            dimension: corpus.dimension(),
            quarantined: corpus.quarantine_reason().map(str::to_string),
        }
    }

    /// Replace the in-memory corpus with the persisted one, clearing any quarantine
    pub async fn reload(&self) -> Result<()> {
        let fresh = Corpus::open(&self.settings.corpus_prefix, self.settings.dimension)?;
        let mut corpus = self.corpus.write().await;
        *corpus = fresh;
        info!("Reloaded corpus with {} chunks", corpus.len());
        Ok(())
    }
}
