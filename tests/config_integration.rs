//! Building an engine from a TOML configuration file

use pdfrag::config::Config;
use pdfrag::engine::RagEngine;
use pdfrag::error::{ErrorKind, RagError};
use tempfile::TempDir;

fn write_config(temp: &TempDir, body: &str) -> std::path::PathBuf {
    let path = temp.path().join("config.toml");
    let mut config = Config::default();
    config.storage.data_dir = temp.path().join("data");
    config.embedding.provider = "hashing".to_string();
    config.embedding.dimension = 128;
    config.save(&path).unwrap();

    if !body.is_empty() {
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str(body);
        std::fs::write(&path, content).unwrap();
    }
    path
}

#[tokio::test]
async fn test_engine_from_config_file() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "");

    let config = Config::load(&path).unwrap();
    let engine = RagEngine::from_config(&config, true).unwrap();

    engine
        .ingest_text("configured corpus words", "notes.txt", None)
        .await
        .unwrap();

    let stats = engine.stats().await;
    assert_eq!(stats.dimension, 128);
    assert_eq!(stats.chunks, 1);
    assert!(temp.path().join("data").join("rag_index.index").exists());
    assert!(temp.path().join("data").join("rag_index.store").exists());
}

#[tokio::test]
async fn test_profile_overrides_top_k() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "\n[profiles.wide]\ntop_k = 7\n");

    let config = Config::load_with_profile(&path, "wide").unwrap();
    assert_eq!(config.retrieval.top_k, 7);

    let engine = RagEngine::from_config(&config, true).unwrap();
    assert_eq!(engine.settings().default_top_k, 7);
}

#[test]
fn test_unknown_embedding_provider_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "");

    let content = std::fs::read_to_string(&path)
        .unwrap()
        .replace("provider = \"hashing\"", "provider = \"word2vec\"");
    std::fs::write(&path, content).unwrap();

    assert!(matches!(
        Config::load(&path),
        Err(RagError::ConfigValidation { .. })
    ));
}

#[tokio::test]
async fn test_offline_engine_needs_no_api_key() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "");

    let content = std::fs::read_to_string(&path)
        .unwrap()
        .replace("enabled = false", "enabled = true")
        .replace("GEMINI_API_KEY", "PDFRAG_TEST_KEY_THAT_IS_NEVER_SET");
    std::fs::write(&path, content).unwrap();

    let config = Config::load(&path).unwrap();
    assert!(config.llm.enabled);
    assert!(RagEngine::from_config(&config, true).is_ok());

    match RagEngine::from_config(&config, false) {
        Err(e) => assert_eq!(e.kind(), ErrorKind::Configuration),
        Ok(_) => panic!("generator built without an API key"),
    }
}
