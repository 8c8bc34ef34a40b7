//! Corpus storage
//!
//! A corpus is a [`VectorIndex`] and a [`DocumentStore`] that always move together:
//! record `i` describes vector `i`. On disk the pair lives under one base path as
//! `<prefix>.index` (raw vectors) and `<prefix>.store` (zstd-compressed JSON records that
//! also carry the BLAKE3 checksum of the index file). Loading either succeeds for both
//! artifacts or fails as a whole.

mod artifact;
pub mod document_store;

pub use document_store::{ChunkRecord, DocumentStore, Metadata};

use crate::embedding::VectorIndex;
use crate::error::{RagError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

const STORE_FORMAT_VERSION: u32 = 1;

/// Locations of the two paired artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusPaths {
    pub index: PathBuf,
    pub store: PathBuf,
}

impl CorpusPaths {
    pub fn from_prefix(prefix: &Path) -> Self {
        Self {
            index: with_suffix(prefix, ".index"),
            store: with_suffix(prefix, ".store"),
        }
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// On-disk form of the chunk store
#[derive(Serialize)]
struct StoreArtifactRef<'a> {
    format_version: u32,
    corpus_id: Uuid,
    created_at: DateTime<Utc>,
    saved_at: DateTime<Utc>,
    dimension: usize,
    vector_count: usize,
    index_checksum: String,
    records: &'a [ChunkRecord],
}

#[derive(Deserialize)]
struct StoreArtifact {
    format_version: u32,
    corpus_id: Uuid,
    created_at: DateTime<Utc>,
    dimension: usize,
    vector_count: usize,
    index_checksum: String,
    records: Vec<ChunkRecord>,
}

/// Aggregate of the vector index and the chunk records it is aligned with
#[derive(Debug)]
pub struct Corpus {
    id: Uuid,
    created_at: DateTime<Utc>,
    index: VectorIndex,
    store: DocumentStore,
    quarantine: OnceLock<String>,
}

impl Corpus {
    /// Create an empty corpus for vectors of `dimension` floats
    pub fn new(dimension: usize) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            index: VectorIndex::new(dimension)?,
            store: DocumentStore::new(),
            quarantine: OnceLock::new(),
        })
    }

    /// Load the corpus at `prefix`, or start an empty one if neither artifact exists.
    ///
    /// A persisted corpus whose dimension differs from `dimension` is rejected.
    pub fn open(prefix: &Path, dimension: usize) -> Result<Self> {
        let paths = CorpusPaths::from_prefix(prefix);

        if !paths.index.exists() && !paths.store.exists() {
            tracing::info!("No corpus at {}, starting empty", prefix.display());
            return Self::new(dimension);
        }

        let corpus = Self::load(prefix)?;
        if corpus.dimension() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: corpus.dimension(),
            });
        }
        Ok(corpus)
    }

    /// Load both artifacts at `prefix`; fails if either is missing or they disagree
    pub fn load(prefix: &Path) -> Result<Self> {
        let paths = CorpusPaths::from_prefix(prefix);

        match (paths.index.exists(), paths.store.exists()) {
            (true, true) => {}
            (true, false) => {
                return Err(RagError::IncompleteCorpus {
                    present: paths.index,
                    missing: paths.store,
                })
            }
            (false, true) => {
                return Err(RagError::IncompleteCorpus {
                    present: paths.store,
                    missing: paths.index,
                })
            }
            (false, false) => {
                return Err(RagError::Io {
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    context: format!("No corpus artifacts at {}", prefix.display()),
                })
            }
        }

        let index_bytes = artifact::read(&paths.index)?;
        let store_bytes = artifact::decompress(&artifact::read(&paths.store)?, &paths.store)?;

        let stored: StoreArtifact =
            serde_json::from_slice(&store_bytes).map_err(|e| RagError::CorruptArtifact {
                path: paths.store.clone(),
                reason: e.to_string(),
            })?;

        if stored.format_version != STORE_FORMAT_VERSION {
            return Err(RagError::CorruptArtifact {
                path: paths.store,
                reason: format!("unsupported store format version {}", stored.format_version),
            });
        }

        if artifact::checksum(&index_bytes) != stored.index_checksum {
            return Err(RagError::CorruptArtifact {
                path: paths.index,
                reason: "index does not match the checksum recorded in the store; \
                         the artifacts come from different saves"
                    .to_string(),
            });
        }

        let index =
            VectorIndex::from_bytes(&index_bytes).map_err(|e| RagError::CorruptArtifact {
                path: paths.index.clone(),
                reason: e.to_string(),
            })?;

        if index.dimension() != stored.dimension || index.len() != stored.vector_count {
            return Err(RagError::Consistency(format!(
                "index holds {} vectors of dimension {}, store expects {} of dimension {}",
                index.len(),
                index.dimension(),
                stored.vector_count,
                stored.dimension
            )));
        }

        if index.len() != stored.records.len() {
            return Err(RagError::Consistency(format!(
                "index holds {} vectors but store holds {} records",
                index.len(),
                stored.records.len()
            )));
        }

        let store = DocumentStore::from_records(stored.records).map_err(RagError::Consistency)?;

        tracing::info!(
            "Loaded corpus {} from {} ({} chunks, {}D)",
            stored.corpus_id,
            prefix.display(),
            store.len(),
            index.dimension()
        );

        Ok(Self {
            id: stored.corpus_id,
            created_at: stored.created_at,
            index,
            store,
            quarantine: OnceLock::new(),
        })
    }

    /// Persist both artifacts under `prefix`
    ///
    /// Both files are staged and fsynced before either is renamed into place.
    pub fn save(&self, prefix: &Path) -> Result<()> {
        self.check_alignment()?;

        let paths = CorpusPaths::from_prefix(prefix);
        let index_bytes = self.index.to_bytes();

        let store = StoreArtifactRef {
            format_version: STORE_FORMAT_VERSION,
            corpus_id: self.id,
            created_at: self.created_at,
            saved_at: Utc::now(),
            dimension: self.index.dimension(),
            vector_count: self.index.len(),
            index_checksum: artifact::checksum(&index_bytes),
            records: self.store.records(),
        };
        let store_json = serde_json::to_vec(&store).map_err(|e| RagError::Json {
            source: e,
            context: "Failed to serialize chunk store".to_string(),
        })?;
        let store_bytes = artifact::compress(&store_json)?;

        let staged_index = artifact::stage(&paths.index, &index_bytes)?;
        let staged_store = match artifact::stage(&paths.store, &store_bytes) {
            Ok(staged) => staged,
            Err(e) => {
                artifact::discard(&staged_index);
                return Err(e);
            }
        };

        if let Err(e) = artifact::commit(&staged_index, &paths.index) {
            artifact::discard(&staged_index);
            artifact::discard(&staged_store);
            return Err(e);
        }
        if let Err(e) = artifact::commit(&staged_store, &paths.store) {
            artifact::discard(&staged_store);
            return Err(e);
        }

        tracing::debug!(
            "Saved corpus {} to {} ({} chunks)",
            self.id,
            prefix.display(),
            self.len()
        );
        Ok(())
    }

    /// Append one chunk and its vector, returning the chunk id
    pub(crate) fn append(
        &mut self,
        source: &str,
        chunk_index: usize,
        text: &str,
        metadata: Metadata,
        vector: &[f32],
    ) -> Result<u64> {
        let position = self.index.add(vector)?;
        let id = self.store.append(source, chunk_index, text, metadata);

        if id != position as u64 {
            return Err(RagError::Consistency(format!(
                "chunk id {} assigned to vector position {}",
                id, position
            )));
        }
        Ok(id)
    }

    /// Undo appends made after the corpus held `len` chunks
    pub(crate) fn rollback(&mut self, len: usize) {
        self.index.truncate(len);
        self.store.truncate(len);
    }

    /// Verify that the index and the store have the same length
    pub fn check_alignment(&self) -> Result<()> {
        if self.index.len() != self.store.len() {
            return Err(RagError::Consistency(format!(
                "index holds {} vectors but store holds {} records",
                self.index.len(),
                self.store.len()
            )));
        }
        Ok(())
    }

    /// Refuse further writes to this corpus; the first reason wins
    pub fn quarantine(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.quarantine.set(reason.clone()).is_ok() {
            tracing::error!("Corpus {} quarantined: {}", self.id, reason);
        }
    }

    pub fn quarantine_reason(&self) -> Option<&str> {
        self.quarantine.get().map(String::as_str)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Total number of chunks
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }
}
