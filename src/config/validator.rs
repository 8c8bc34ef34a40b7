use crate::chunking::Chunker;
use crate::config::{parse_duration, parse_size, Config, SCHEMA_VERSION};
use crate::error::{RagError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_ingestion(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        let name = &config.storage.corpus_name;
        if name.is_empty() || name.contains(['/', '\\']) {
            errors.push(ValidationError::new(
                "storage.corpus_name",
                format!("Corpus name must be a non-empty file name, got '{}'", name),
            ));
        }
    }

    fn validate_ingestion(config: &Config, errors: &mut Vec<ValidationError>) {
        let ingestion = &config.ingestion;

        if let Err(e) = Chunker::new(ingestion.chunk_size, ingestion.overlap) {
            errors.push(ValidationError::new("ingestion.overlap", e.to_string()));
        }

        if parse_size(&ingestion.max_file_size).is_none() {
            errors.push(ValidationError::new(
                "ingestion.max_file_size",
                format!("Invalid size format: {}", ingestion.max_file_size),
            ));
        }

        if ingestion.allowed_extensions.is_empty() {
            errors.push(ValidationError::new(
                "ingestion.allowed_extensions",
                "At least one extension must be allowed",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        let valid_providers = ["fastembed", "hashing"];
        if !valid_providers.contains(&embedding.provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, embedding.provider
                ),
            ));
        }

        if embedding.provider == "fastembed" && embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if embedding.max_concurrent == 0 {
            errors.push(ValidationError::new(
                "embedding.max_concurrent",
                "At least one embedding call must be allowed",
            ));
        }

        if parse_duration(&embedding.timeout).is_none() {
            errors.push(ValidationError::new(
                "embedding.timeout",
                format!("Invalid duration format: {}", embedding.timeout),
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let llm = &config.llm;

        // The key value is only read when a generator is built
        if llm.enabled && llm.api_key_env.trim().is_empty() {
            errors.push(ValidationError::new(
                "llm.api_key_env",
                "API key environment variable name cannot be empty",
            ));
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    llm.temperature
                ),
            ));
        }

        let valid_providers = ["gemini"];
        if !valid_providers.contains(&llm.provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, llm.provider
                ),
            ));
        }

        if parse_duration(&llm.timeout).is_none() {
            errors.push(ValidationError::new(
                "llm.timeout",
                format!("Invalid duration format: {}", llm.timeout),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn error_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(RagError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(()) => Vec::new(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_overlap_not_smaller_than_chunk_size() {
        let mut config = Config::default();
        config.ingestion.chunk_size = 50;
        config.ingestion.overlap = 50;
        assert_eq!(error_paths(&config), vec!["ingestion.overlap"]);
    }

    #[test]
    fn test_collects_every_violation() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::new();
        config.embedding.dimension = 0;
        config.embedding.timeout = "soon".to_string();
        config.retrieval.top_k = 0;

        let paths = error_paths(&config);
        assert_eq!(paths.len(), 4);
        assert!(paths.contains(&"storage.data_dir".to_string()));
        assert!(paths.contains(&"embedding.dimension".to_string()));
        assert!(paths.contains(&"embedding.timeout".to_string()));
        assert!(paths.contains(&"retrieval.top_k".to_string()));
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.embedding.provider = "word2vec".to_string();
        assert_eq!(error_paths(&config), vec!["embedding.provider"]);
    }

    #[test]
    fn test_enabled_llm_requires_key_env_name() {
        let mut config = Config::default();
        config.llm.enabled = true;
        config.llm.api_key_env = String::new();
        assert_eq!(error_paths(&config), vec!["llm.api_key_env"]);
    }

    #[test]
    fn test_unset_api_key_is_not_a_config_error() {
        let mut config = Config::default();
        config.llm.enabled = true;
        config.llm.api_key_env = "PDFRAG_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.embedding.max_concurrent = 0;
        assert_eq!(error_paths(&config), vec!["embedding.max_concurrent"]);
    }
}
