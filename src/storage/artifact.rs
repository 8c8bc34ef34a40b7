//! File-level helpers for corpus artifacts: staged atomic writes, zstd, BLAKE3

use crate::error::{RagError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// zstd level used for the chunk store
const COMPRESSION_LEVEL: i32 = 3;

/// Write `data` next to `path` under a temporary name and fsync it.
///
/// Nothing is visible at `path` until [`commit`] renames the staged file.
pub(crate) fn stage(path: &Path, data: &[u8]) -> Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| RagError::Config(format!("Invalid artifact path: {}", path.display())))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to create corpus directory: {}", parent.display()),
        })?;
    }

    let temp_path = temp_path(path);
    let mut file = fs::File::create(&temp_path).map_err(|e| RagError::Io {
        source: e,
        context: format!("Failed to create temp artifact: {}", temp_path.display()),
    })?;
    file.write_all(data).map_err(|e| RagError::Io {
        source: e,
        context: format!("Failed to write temp artifact: {}", temp_path.display()),
    })?;
    file.sync_all().map_err(|e| RagError::Io {
        source: e,
        context: format!("Failed to sync temp artifact: {}", temp_path.display()),
    })?;

    Ok(temp_path)
}

/// Atomically move a staged file into place
pub(crate) fn commit(staged: &Path, path: &Path) -> Result<()> {
    fs::rename(staged, path).map_err(|e| RagError::Io {
        source: e,
        context: format!(
            "Failed to move {} into place at {}",
            staged.display(),
            path.display()
        ),
    })
}

/// Best-effort removal of a staged file that will not be committed
pub(crate) fn discard(staged: &Path) {
    if let Err(e) = fs::remove_file(staged) {
        tracing::debug!("Failed to remove staged file {}: {}", staged.display(), e);
    }
}

pub(crate) fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| RagError::Io {
        source: e,
        context: format!("Failed to read corpus artifact: {}", path.display()),
    })
}

pub(crate) fn compress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, COMPRESSION_LEVEL).map_err(|e| RagError::Io {
        source: e,
        context: "Failed to compress chunk store".to_string(),
    })
}

pub(crate) fn decompress(data: &[u8], path: &Path) -> Result<Vec<u8>> {
    zstd::decode_all(data).map_err(|e| RagError::CorruptArtifact {
        path: path.to_path_buf(),
        reason: format!("zstd decode failed: {}", e),
    })
}

/// Hex BLAKE3 digest
pub(crate) fn checksum(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_then_commit() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("corpus.index");

        let staged = stage(&path, b"payload").unwrap();
        assert!(staged.exists());
        assert!(!path.exists());

        commit(&staged, &path).unwrap();
        assert!(!staged.exists());
        assert_eq!(read(&path).unwrap(), b"payload");
    }

    #[test]
    fn test_compress_round_trip() {
        let data = vec![b'A'; 10_000];
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed, Path::new("x")).unwrap(), data);
    }

    #[test]
    fn test_decompress_garbage() {
        let result = decompress(b"not zstd at all", Path::new("corpus.store"));
        assert!(matches!(result, Err(RagError::CorruptArtifact { .. })));
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(checksum(b"abc"), checksum(b"abc"));
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
        assert_eq!(checksum(b"abc").len(), 64);
    }
}
