//! Ordered chunk records, positionally aligned with the vector index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Caller-supplied metadata attached to every chunk of a document
pub type Metadata = Map<String, Value>;

/// One retrievable unit of a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Corpus-wide id; equals the chunk's position in the vector index
    pub id: u64,
    /// Originating document (file name)
    pub source: String,
    /// Position of the chunk within its source document
    pub chunk_index: usize,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub ingested_at: DateTime<Utc>,
}

/// Append-only store of chunk records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStore {
    records: Vec<ChunkRecord>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record under the next sequential id and return that id
    pub fn append(
        &mut self,
        source: impl Into<String>,
        chunk_index: usize,
        text: impl Into<String>,
        metadata: Metadata,
    ) -> u64 {
        let id = self.records.len() as u64;
        self.records.push(ChunkRecord {
            id,
            source: source.into(),
            chunk_index,
            text: text.into(),
            metadata,
            ingested_at: Utc::now(),
        });
        id
    }

    pub fn get(&self, id: u64) -> Option<&ChunkRecord> {
        usize::try_from(id).ok().and_then(|i| self.records.get(i))
    }

    /// Distinct source names, sorted
    pub fn all_sources(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.source.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    /// Rebuild a store from persisted records, checking that ids are dense and ordered
    pub fn from_records(records: Vec<ChunkRecord>) -> Result<Self, String> {
        if let Some((position, record)) = records
            .iter()
            .enumerate()
            .find(|(position, record)| record.id != *position as u64)
        {
            return Err(format!(
                "record at position {} carries id {}",
                position, record.id
            ));
        }
        Ok(Self { records })
    }

    #[cfg(test)]
    pub(crate) fn into_records(self) -> Vec<ChunkRecord> {
        self.records
    }

    /// Drop every record at or after `len`. Only used to undo an uncommitted append.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }
}
