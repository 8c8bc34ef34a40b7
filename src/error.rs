use crate::chunking::ChunkingError;
use crate::embedding::{EmbeddingError, VectorIndexError};
use crate::retrieval::GenerationError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for pdfrag
#[derive(Error, Debug)]
pub enum RagError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Chunker settings rejected
    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    /// Vector dimension disagrees with the corpus contract
    #[error("Dimension mismatch: corpus expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding service failure
    #[error("Embedding service error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Generation service failure
    #[error("Generation service error: {0}")]
    Generation(#[from] GenerationError),

    /// External call exceeded its time budget
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Vector index errors
    #[error("Vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),

    /// Index and document store disagree
    #[error("Corpus consistency violated: {0}")]
    Consistency(String),

    /// Writes refused after a consistency violation
    #[error("Corpus is quarantined and refuses writes: {reason}")]
    CorpusQuarantined { reason: String },

    /// Only one of the two paired artifacts exists
    #[error("Incomplete corpus: found {present} but {missing} is missing")]
    IncompleteCorpus { present: PathBuf, missing: PathBuf },

    /// Persisted artifact could not be decoded or failed verification
    #[error("Corrupt corpus artifact {path}: {reason}")]
    CorruptArtifact { path: PathBuf, reason: String },

    /// Document text could not be extracted
    #[error("Document unreadable: {path}: {reason}")]
    DocumentUnreadable { path: PathBuf, reason: String },

    /// Document rejected before extraction
    #[error("Unsupported document {path}: {reason}")]
    UnsupportedDocument { path: PathBuf, reason: String },

    /// Caller supplied an invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad settings or contract violations; fatal, never retried
    Configuration,
    /// Embedding or generation failed or timed out; retryable with backoff
    ExternalService,
    /// Index/store desynchronisation; stops further writes
    Consistency,
    /// Rejected argument
    InvalidInput,
    /// A single document could not be read or was refused
    Document,
    /// Filesystem or artifact encoding problems
    Storage,
}

impl RagError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Config(_)
            | RagError::ConfigValidation { .. }
            | RagError::ConfigNotFound { .. }
            | RagError::InvalidConfigValue { .. }
            | RagError::Chunking(_)
            | RagError::DimensionMismatch { .. }
            | RagError::Toml(_)
            | RagError::TomlSerialization(_) => ErrorKind::Configuration,
            RagError::Embedding(EmbeddingError::DimensionMismatch { .. })
            | RagError::Embedding(EmbeddingError::InitializationError(_)) => {
                ErrorKind::Configuration
            }
            RagError::Embedding(EmbeddingError::InvalidInput(_)) => ErrorKind::InvalidInput,
            RagError::Generation(GenerationError::MissingApiKey(_)) => ErrorKind::Configuration,
            RagError::Embedding(_) | RagError::Generation(_) | RagError::Timeout { .. } => {
                ErrorKind::ExternalService
            }
            RagError::VectorIndex(VectorIndexError::InvalidDimension { .. }) => {
                ErrorKind::Configuration
            }
            RagError::VectorIndex(_)
            | RagError::CorruptArtifact { .. }
            | RagError::IncompleteCorpus { .. }
            | RagError::Io { .. }
            | RagError::Json { .. }
            | RagError::Other(_) => ErrorKind::Storage,
            RagError::Consistency(_) | RagError::CorpusQuarantined { .. } => {
                ErrorKind::Consistency
            }
            RagError::DocumentUnreadable { .. } | RagError::UnsupportedDocument { .. } => {
                ErrorKind::Document
            }
            RagError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Whether the caller may retry the same unit of work later
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ExternalService
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for pdfrag operations
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_retryable() {
        let err = RagError::Timeout {
            operation: "embedding",
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let err = RagError::DimensionMismatch {
            expected: 768,
            actual: 384,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_retryable());

        let err = RagError::VectorIndex(VectorIndexError::InvalidDimension {
            expected: 4,
            actual: 3,
        });
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_consistency_not_retryable() {
        let err = RagError::Consistency("position 3 has no record".to_string());
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(!err.is_retryable());
    }
}
