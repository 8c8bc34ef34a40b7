//! Grounded answer synthesis over retrieved chunks

use super::RetrievedChunk;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Answer returned when the corpus holds nothing
pub const NO_DOCUMENTS_ANSWER: &str = "No documents in the RAG system. Please upload PDFs first.";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Generation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Generation service returned no text")]
    EmptyResponse,
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::Http(e.to_string())
    }
}

/// Opaque text-completion service
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// Result of a synthesis attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    Answer(String),
    Error { reason: String, retryable: bool },
}

/// Builds grounded prompts and calls the generator, if one is configured
pub struct AnswerSynthesizer {
    generator: Option<Arc<dyn Generator>>,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self {
            generator: Some(generator),
            timeout,
        }
    }

    /// Synthesizer without a generator; every synthesis reports generation as disabled
    pub fn offline() -> Self {
        Self {
            generator: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.generator.is_none()
    }

    /// Prompt listing each chunk under its source, followed by the question
    pub fn build_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
        let context = chunks
            .iter()
            .map(|chunk| format!("[Source: {}]\n{}", chunk.source, chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Based on the following document excerpts, answer the user's question.\n\
             If the information is not in the documents, say so.\n\
             \n\
             Documents:\n\
             {context}\n\
             \n\
             Question: {question}\n\
             \n\
             Answer:"
        )
    }

    /// Answer `question` from `chunks`; never called with an empty chunk list by the engine
    pub async fn synthesize(&self, question: &str, chunks: &[RetrievedChunk]) -> Synthesis {
        let Some(generator) = &self.generator else {
            return Synthesis::Error {
                reason: "generation disabled".to_string(),
                retryable: false,
            };
        };

        let prompt = Self::build_prompt(question, chunks);
        debug!(
            "Generating answer with {} from {} chunks ({} prompt chars)",
            generator.model_name(),
            chunks.len(),
            prompt.len()
        );

        match tokio::time::timeout(self.timeout, generator.generate(&prompt)).await {
            Err(_) => {
                warn!("Generation timed out after {:?}", self.timeout);
                Synthesis::Error {
                    reason: format!("generation timed out after {:?}", self.timeout),
                    retryable: true,
                }
            }
            Ok(Err(e)) => {
                warn!("Generation failed: {}", e);
                Synthesis::Error {
                    retryable: !matches!(e, GenerationError::MissingApiKey(_)),
                    reason: e.to_string(),
                }
            }
            Ok(Ok(text)) if text.trim().is_empty() => Synthesis::Error {
                reason: GenerationError::EmptyResponse.to_string(),
                retryable: true,
            },
            Ok(Ok(text)) => Synthesis::Answer(text.trim().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Metadata;
    use std::sync::Mutex;

    struct EchoGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("  Revenue grew 12%.  ".to_string())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct StalledGenerator;

    #[async_trait]
    impl Generator for StalledGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("too late".to_string())
        }

        fn model_name(&self) -> &str {
            "stalled"
        }
    }

    fn chunk(source: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: 0,
            source: source.to_string(),
            chunk_index: 0,
            text: text.to_string(),
            metadata: Metadata::new(),
            distance: 0.1,
        }
    }

    #[test]
    fn test_prompt_lists_sources() {
        let prompt = AnswerSynthesizer::build_prompt(
            "How did revenue change?",
            &[chunk("q1.pdf", "Revenue grew 12%."), chunk("q2.pdf", "Costs fell.")],
        );

        assert!(prompt.contains("[Source: q1.pdf]\nRevenue grew 12%.\n\n[Source: q2.pdf]\nCosts fell."));
        assert!(prompt.contains("If the information is not in the documents, say so."));
        assert!(prompt.ends_with("Question: How did revenue change?\n\nAnswer:"));
    }

    #[tokio::test]
    async fn test_answer_is_trimmed() {
        let generator = Arc::new(EchoGenerator {
            prompts: Mutex::new(Vec::new()),
        });
        let synthesizer = AnswerSynthesizer::new(generator.clone(), Duration::from_secs(5));

        let result = synthesizer
            .synthesize("growth?", &[chunk("q1.pdf", "Revenue grew 12%.")])
            .await;

        assert_eq!(result, Synthesis::Answer("Revenue grew 12%.".to_string()));
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_becomes_retryable_error() {
        let synthesizer =
            AnswerSynthesizer::new(Arc::new(StalledGenerator), Duration::from_millis(50));

        let result = synthesizer.synthesize("q", &[chunk("a.pdf", "x")]).await;
        assert!(matches!(result, Synthesis::Error { retryable: true, .. }));
    }

    #[tokio::test]
    async fn test_offline_reports_disabled() {
        let synthesizer = AnswerSynthesizer::offline();
        assert!(synthesizer.is_offline());
        assert_eq!(
            synthesizer.synthesize("q", &[chunk("a.pdf", "x")]).await,
            Synthesis::Error {
                reason: "generation disabled".to_string(),
                retryable: false
            }
        );
    }
}
