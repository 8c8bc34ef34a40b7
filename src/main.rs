use pdfrag::cli::{Cli, Commands, ConfigAction};
use pdfrag::config::Config;
use pdfrag::config::ConfigValidator;
use pdfrag::engine::{AnswerStatus, BatchStop, RagEngine};
use pdfrag::error::{RagError, Result};
use pdfrag::storage::Metadata;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Ingest {
            paths,
            category,
            meta,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_ingest(&config, paths, category, meta)?;
        }
        Commands::Ask {
            question,
            top_k,
            offline,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_ask(&config, &question, top_k, offline, json)?;
        }
        Commands::Status { json } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_status(&config, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "pdfrag=debug" } else { "pdfrag=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| RagError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn cmd_ingest(
    config: &Config,
    paths: Vec<PathBuf>,
    category: Option<String>,
    meta: Vec<(String, String)>,
) -> Result<()> {
    let mut metadata = Metadata::new();
    if let Some(category) = category {
        metadata.insert("category".to_string(), Value::String(category));
    }
    for (key, value) in meta {
        metadata.insert(key, Value::String(value));
    }

    let rt = runtime()?;
    rt.block_on(async {
        let engine = RagEngine::from_config(config, true)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current document");
                flag.store(true, Ordering::SeqCst);
            }
        });

        let report = engine.ingest_paths(&paths, Some(metadata), &cancel).await?;

        for outcome in &report.documents {
            match &outcome.result {
                Ok(doc) if doc.is_complete() => {
                    println!("✓ {} ({} chunks)", doc.source, doc.chunks_ingested)
                }
                Ok(doc) => println!(
                    "! {} ({} chunks, {} failed)",
                    doc.source, doc.chunks_ingested, doc.chunks_failed
                ),
                Err(e) => println!("✗ {}: {}", outcome.path.display(), e),
            }
        }

        println!(
            "\n{} documents processed, {} chunks ingested, {} chunks failed",
            report.documents.len(),
            report.chunks_ingested(),
            report.chunks_failed()
        );
        println!("Corpus size: {} chunks", engine.corpus_size().await);

        match report.stopped {
            Some(BatchStop::Cancelled) => println!("Interrupted; remaining documents skipped"),
            Some(BatchStop::Fatal) => println!("Stopped early; see the last error above"),
            None => {}
        }

        Ok::<(), RagError>(())
    })
}

fn cmd_ask(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    offline: bool,
    json: bool,
) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let engine = RagEngine::from_config(config, offline)?;
        let top_k = top_k.unwrap_or(engine.settings().default_top_k);
        let response = engine.ask(question, top_k).await?;

        if json {
            let out = serde_json::to_string_pretty(&response).map_err(|e| RagError::Json {
                source: e,
                context: "Failed to serialize answer".to_string(),
            })?;
            println!("{}", out);
            return Ok(());
        }

        println!("{}", response.answer);

        if !response.sources.is_empty() {
            println!("\nSources: {}", response.sources.join(", "));
        }

        if response.status == AnswerStatus::GenerationFailed {
            println!();
            for chunk in &response.retrieved_chunks {
                println!(
                    "[{}#{}] (distance {:.4})\n  {}\n",
                    chunk.source,
                    chunk.chunk_index,
                    chunk.distance,
                    chunk.preview(300)
                );
            }
        }

        Ok::<(), RagError>(())
    })
}

fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let engine = RagEngine::from_config(config, true)?;
        let stats = engine.stats().await;

        if json {
            let out = serde_json::to_string_pretty(&stats).map_err(|e| RagError::Json {
                source: e,
                context: "Failed to serialize status".to_string(),
            })?;
            println!("{}", out);
            return Ok(());
        }

        println!("pdfrag Status");
        println!("=============");
        println!("\nCorpus: {}", engine.settings().corpus_prefix.display());
        println!("  ID:        {}", stats.corpus_id);
        println!(
            "  Created:   {}",
            stats.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("  Chunks:    {}", stats.chunks);
        println!("  Dimension: {}", stats.dimension);
        if let Some(reason) = &stats.quarantined {
            println!("  Quarantined: {}", reason);
        }

        println!("\nDocuments: {} total", stats.sources.len());
        for source in &stats.sources {
            println!("  {}", source);
        }

        Ok::<(), RagError>(())
    })
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RagError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'pdfrag config init' to create one."
        );
        let mut config = Config::default();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}
