//! Document intake: admission checks and "document -> raw text" extraction

use crate::error::{RagError, Result};
use std::path::Path;

/// Capability that turns a document on disk into plain text
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String>;
}

/// PDF text extraction via `pdf-extract`
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String> {
        // pdf-extract panics on some malformed files instead of returning an error
        let outcome = std::panic::catch_unwind(|| pdf_extract::extract_text(path));

        match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(RagError::DocumentUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RagError::DocumentUnreadable {
                path: path.to_path_buf(),
                reason: "PDF parser aborted on malformed input".to_string(),
            }),
        }
    }
}

/// UTF-8 text files (`.txt`, `.md`)
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| RagError::DocumentUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Dispatches on the file extension: `.pdf` to [`PdfTextExtractor`], anything else as plain text
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor {
    pdf: PdfTextExtractor,
    plain: PlainTextExtractor,
}

impl TextExtractor for DocumentExtractor {
    fn extract_text(&self, path: &Path) -> Result<String> {
        match extension(path).as_deref() {
            Some("pdf") => self.pdf.extract_text(path),
            _ => self.plain.extract_text(path),
        }
    }
}

/// Admission rules applied before a document is read
#[derive(Debug, Clone)]
pub struct DocumentPolicy {
    allowed_extensions: Vec<String>,
    max_file_size: u64,
}

impl DocumentPolicy {
    pub fn new(allowed_extensions: &[String], max_file_size: u64) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            max_file_size,
        }
    }

    pub fn allows_extension(&self, path: &Path) -> bool {
        extension(path).is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }

    /// Reject missing files, disallowed extensions and oversized files
    pub fn check(&self, path: &Path) -> Result<()> {
        let metadata = std::fs::metadata(path).map_err(|e| RagError::DocumentUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !metadata.is_file() {
            return Err(RagError::UnsupportedDocument {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        if !self.allows_extension(path) {
            return Err(RagError::UnsupportedDocument {
                path: path.to_path_buf(),
                reason: format!(
                    "extension not allowed (allowed: {})",
                    self.allowed_extensions.join(", ")
                ),
            });
        }

        if metadata.len() > self.max_file_size {
            return Err(RagError::UnsupportedDocument {
                path: path.to_path_buf(),
                reason: format!(
                    "file is {} bytes, limit is {} bytes",
                    metadata.len(),
                    self.max_file_size
                ),
            });
        }

        Ok(())
    }
}

/// Name under which a document's chunks are recorded
pub fn source_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::UnsupportedDocument {
            path: path.to_path_buf(),
            reason: "path has no UTF-8 file name".to_string(),
        })
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
}
