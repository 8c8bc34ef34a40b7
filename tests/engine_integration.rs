//! End-to-end tests: ingest, retrieve and answer through RagEngine
//!
//! Uses the hashing embedder and scripted generators, so no model download or network.

use async_trait::async_trait;
use pdfrag::embedding::HashingEmbedder;
use pdfrag::engine::{AnswerStatus, EngineSettings, RagEngine};
use pdfrag::error::RagError;
use pdfrag::ingestion::PlainTextExtractor;
use pdfrag::retrieval::{GenerationError, Generator, NO_DOCUMENTS_ANSWER};
use pdfrag::storage::Metadata;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const DIM: usize = 64;

/// Returns a fixed answer and records every prompt
struct ScriptedGenerator {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct FailingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GenerationError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

fn engine_at(temp: &TempDir, generator: Option<Arc<dyn Generator>>) -> RagEngine {
    RagEngine::new(
        EngineSettings::new(temp.path().join("rag_index"), DIM),
        Arc::new(HashingEmbedder::new(DIM).unwrap()),
        generator,
        Arc::new(PlainTextExtractor),
    )
    .unwrap()
}

/// `count` words, each unique to this document
fn document(topic: &str, count: usize) -> String {
    (0..count)
        .map(|i| format!("{}{}", topic, i))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One word repeated `count` times
fn repeated(word: &str, count: usize) -> String {
    vec![word; count].join(" ")
}

#[tokio::test]
async fn test_thousand_word_document_yields_three_chunks() {
    let temp = TempDir::new().unwrap();
    let engine = engine_at(&temp, None);

    let report = engine
        .ingest_text(&document("w", 1000), "report.pdf", None)
        .await
        .unwrap();

    assert_eq!(report.chunks_ingested, 3);
    assert_eq!(engine.corpus_size().await, 3);
}

#[tokio::test]
async fn test_two_documents_then_ask() {
    let temp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new("Revenue grew in Q3.");
    let engine = engine_at(&temp, Some(generator.clone()));

    let mut metadata = Metadata::new();
    metadata.insert("category".to_string(), json!("NebulaByte"));

    let a = engine
        .ingest_text(&repeated("alpha", 600), "a.pdf", Some(metadata))
        .await
        .unwrap();
    let b = engine
        .ingest_text(&document("beta", 1000), "b.pdf", None)
        .await
        .unwrap();

    assert_eq!(a.chunks_ingested, 2);
    assert_eq!(b.chunks_ingested, 3);
    assert_eq!(engine.corpus_size().await, 5);

    let response = engine.ask("Alpha?", 10).await.unwrap();

    assert_eq!(response.status, AnswerStatus::Answered);
    assert_eq!(response.answer, "Revenue grew in Q3.");
    assert!(response.retrieved_chunks.len() <= 5);
    assert!(response
        .retrieved_chunks
        .windows(2)
        .all(|pair| pair[0].distance <= pair[1].distance));
    assert!(response.retrieved_chunks.iter().all(|c| c.distance >= 0.0));

    // both a.pdf chunks embed exactly like the question; ties keep insertion order
    let best = &response.retrieved_chunks[0];
    assert_eq!(best.distance, 0.0);
    assert_eq!(best.source, "a.pdf");
    assert_eq!(best.chunk_index, 0);
    assert_eq!(best.metadata["category"], json!("NebulaByte"));
    assert_eq!(response.sources[0], "a.pdf");

    assert_eq!(generator.calls(), 1);
    let prompt = generator.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("[Source: a.pdf]"));
    assert!(prompt.contains("Question: Alpha?"));
}

#[tokio::test]
async fn test_empty_corpus_never_calls_generator() {
    let temp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new("should not be used");
    let engine = engine_at(&temp, Some(generator.clone()));

    let response = engine.ask("what is in the documents?", 3).await.unwrap();

    assert_eq!(response.status, AnswerStatus::NoDocuments);
    assert_eq!(response.answer, NO_DOCUMENTS_ANSWER);
    assert!(response.sources.is_empty());
    assert!(response.retrieved_chunks.is_empty());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_questions_racing_first_ingestion_see_documents_or_no_documents() {
    let temp = TempDir::new().unwrap();
    let engine = Arc::new(engine_at(&temp, None));

    let writer = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .ingest_text(&document("omega", 200), "o.pdf", None)
                .await
        })
    };

    let mut readers = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&engine);
        readers.push(tokio::spawn(async move { engine.ask("omega7", 3).await }));
    }

    for reader in readers {
        let response = reader.await.unwrap().unwrap();
        if response.retrieved_chunks.is_empty() {
            assert_eq!(response.status, AnswerStatus::NoDocuments);
            assert_eq!(response.answer, NO_DOCUMENTS_ANSWER);
        } else {
            assert_eq!(response.status, AnswerStatus::GenerationFailed);
        }
    }
    writer.await.unwrap().unwrap();

    let after = engine.ask("omega7", 3).await.unwrap();
    assert_eq!(after.status, AnswerStatus::GenerationFailed);
    assert_eq!(after.sources, vec!["o.pdf".to_string()]);
}

#[tokio::test]
async fn test_zero_top_k_is_rejected() {
    let temp = TempDir::new().unwrap();
    let engine = engine_at(&temp, None);
    engine
        .ingest_text("some indexed words", "a.txt", None)
        .await
        .unwrap();

    assert!(matches!(
        engine.ask("words", 0).await,
        Err(RagError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.retrieve("words", 0).await,
        Err(RagError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_generation_failure_degrades_to_chunks() {
    let temp = TempDir::new().unwrap();
    let generator = Arc::new(FailingGenerator {
        calls: AtomicUsize::new(0),
    });
    let engine = engine_at(&temp, Some(generator.clone()));
    engine
        .ingest_text(&document("gamma", 100), "c.pdf", None)
        .await
        .unwrap();

    let response = engine.ask("gamma5", 3).await.unwrap();

    assert_eq!(response.status, AnswerStatus::GenerationFailed);
    assert!(response.answer.contains("503"));
    assert_eq!(response.retrieved_chunks.len(), 1);
    assert_eq!(response.sources, vec!["c.pdf".to_string()]);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_offline_engine_returns_excerpts() {
    let temp = TempDir::new().unwrap();
    let engine = engine_at(&temp, None);
    engine
        .ingest_text(&document("delta", 50), "d.md", None)
        .await
        .unwrap();

    let response = engine.ask("delta1", 3).await.unwrap();
    assert_eq!(response.status, AnswerStatus::GenerationFailed);
    assert!(response.answer.contains("generation disabled"));
    assert_eq!(response.retrieved_chunks[0].source, "d.md");
}

#[tokio::test]
async fn test_stats_lists_sources() {
    let temp = TempDir::new().unwrap();
    let engine = engine_at(&temp, None);
    engine.ingest_text("zeta words", "z.pdf", None).await.unwrap();
    engine.ingest_text("eta words", "e.pdf", None).await.unwrap();

    let stats = engine.stats().await;
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.dimension, DIM);
    assert_eq!(stats.sources, vec!["e.pdf".to_string(), "z.pdf".to_string()]);
    assert!(stats.quarantined.is_none());
}

#[tokio::test]
async fn test_embedder_dimension_must_match_settings() {
    let temp = TempDir::new().unwrap();
    let result = RagEngine::new(
        EngineSettings::new(temp.path().join("rag_index"), DIM),
        Arc::new(HashingEmbedder::new(DIM / 2).unwrap()),
        None,
        Arc::new(PlainTextExtractor),
    );

    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: DIM,
            actual: 32
        })
    ));
}
