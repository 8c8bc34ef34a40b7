/// Exact nearest-neighbour index over fixed-dimension vectors
use ndarray::{ArrayView1, ArrayView2};
use std::cmp::Ordering;
use thiserror::Error;

/// Magic bytes at the start of a serialized index
const MAGIC: [u8; 4] = *b"PRVX";
const FORMAT_VERSION: u16 = 1;
/// magic + version + dimension + count
const HEADER_LEN: usize = 4 + 2 + 4 + 8;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Index dimension must be greater than 0")]
    ZeroDimension,

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index storage has an invalid shape: {0}")]
    Shape(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Search hit: insertion position and squared Euclidean distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Position of the vector in insertion order
    pub position: usize,
    /// Squared Euclidean distance to the query (lower is closer)
    pub distance: f32,
}

/// Flat (exhaustive) L2 index
///
/// Vectors are stored row-major in one contiguous buffer; position `i` is the `i`-th
/// vector ever added. Search is exact, so results are reproducible bit-for-bit across
/// serialization round trips. Ordering is ascending distance with ties broken by the
/// earlier insertion position.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` floats
    pub fn new(dimension: usize) -> Result<Self, VectorIndexError> {
        if dimension == 0 {
            return Err(VectorIndexError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Append a vector, returning its position
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, VectorIndexError> {
        self.check_dimension(vector)?;
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// Return up to `k` nearest vectors by ascending squared Euclidean distance
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.check_dimension(query)?;

        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let rows = ArrayView2::from_shape((self.len(), self.dimension), &self.data)
            .map_err(|e| VectorIndexError::Shape(e.to_string()))?;
        let query = ArrayView1::from(query);

        let mut hits: Vec<SearchResult> = rows
            .outer_iter()
            .enumerate()
            .map(|(position, row)| {
                let diff = &row - &query;
                SearchResult {
                    position,
                    distance: diff.dot(&diff),
                }
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank_order);
            hits.truncate(k);
        }
        hits.sort_by(rank_order);

        Ok(hits)
    }

    /// Stored vector at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Drop every vector at or after `len`. Only used to undo an uncommitted append.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimension);
    }

    /// Encode as `PRVX | version u16 | dimension u32 | count u64 | f32 rows`, little-endian
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);

        buffer.extend_from_slice(&MAGIC);
        buffer.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buffer.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        buffer.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            buffer.extend_from_slice(&value.to_le_bytes());
        }

        buffer
    }

    /// Decode bytes produced by [`VectorIndex::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VectorIndexError> {
        if bytes.len() < HEADER_LEN {
            return Err(VectorIndexError::SerializationError(format!(
                "File too short: {} bytes",
                bytes.len()
            )));
        }

        let (header, body) = bytes.split_at(HEADER_LEN);
        if header[0..4] != MAGIC {
            return Err(VectorIndexError::SerializationError(
                "Invalid magic".to_string(),
            ));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != FORMAT_VERSION {
            return Err(VectorIndexError::SerializationError(format!(
                "Unsupported index format version {}",
                version
            )));
        }

        let dimension = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header[10..18]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        if dimension == 0 {
            return Err(VectorIndexError::ZeroDimension);
        }

        let expected_len = count
            .checked_mul(dimension)
            .and_then(|floats| floats.checked_mul(4))
            .ok_or_else(|| {
                VectorIndexError::SerializationError("Vector count overflows".to_string())
            })?;
        if body.len() != expected_len {
            return Err(VectorIndexError::SerializationError(format!(
                "Expected {} bytes of vector data for {} vectors, found {}",
                expected_len,
                count,
                body.len()
            )));
        }

        let data = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dimension, data })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn rank_order(a: &SearchResult, b: &SearchResult) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.position.cmp(&b.position))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dimension: usize, axis: usize, scale: f32) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[axis] = scale;
        v
    }

    #[test]
    fn test_index_creation() {
        let index = VectorIndex::new(768).unwrap();
        assert_eq!(index.dimension(), 768);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
        assert!(VectorIndex::new(0).is_err());
    }

    #[test]
    fn test_insert_and_search() {
        let mut index = VectorIndex::new(4).unwrap();

        assert_eq!(index.add(&unit(4, 0, 1.0)).unwrap(), 0);
        assert_eq!(index.add(&unit(4, 1, 1.0)).unwrap(), 1);
        assert_eq!(index.add(&[0.9, 0.1, 0.0, 0.0]).unwrap(), 2);
        assert_eq!(index.len(), 3);

        let results = index.search(&unit(4, 0, 1.0), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].position, 0);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results[1].position, 2);
        assert!((results[1].distance - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_fewer_vectors_than_k() {
        let mut index = VectorIndex::new(2).unwrap();
        assert!(index.search(&[0.0, 0.0], 5).unwrap().is_empty());

        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[3.0, 0.0]).unwrap();

        let results = index.search(&[0.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].distance, 1.0);
        assert_eq!(results[1].distance, 9.0);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let mut index = VectorIndex::new(2).unwrap();
        index.add(&[5.0, 5.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, -1.0]).unwrap();

        let results = index.search(&[0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = results.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert!(results.iter().all(|r| r.distance == 1.0));
    }

    #[test]
    fn test_reflexive_nearest_neighbour() {
        let mut index = VectorIndex::new(3).unwrap();
        let vectors = [
            [0.1, 0.2, 0.3],
            [0.4, -0.5, 0.6],
            [1.0, 1.0, 1.0],
            [-2.0, 0.0, 0.5],
        ];
        for v in &vectors {
            index.add(v).unwrap();
        }

        for position in 0..index.len() {
            let stored = index.vector(position).unwrap().to_vec();
            let results = index.search(&stored, 1).unwrap();
            assert_eq!(results[0].position, position);
            assert_eq!(results[0].distance, 0.0);
        }
    }

    #[test]
    fn test_dimension_validation() {
        let mut index = VectorIndex::new(4).unwrap();
        let result = index.add(&[1.0; 3]);
        assert!(matches!(
            result,
            Err(VectorIndexError::InvalidDimension {
                expected: 4,
                actual: 3
            })
        ));
        assert!(index.is_empty());
        assert!(index.search(&[1.0; 5], 1).is_err());
    }

    #[test]
    fn test_bytes_round_trip_preserves_search() {
        let mut index = VectorIndex::new(3).unwrap();
        for i in 0..20 {
            let f = i as f32;
            index.add(&[f.sin(), f.cos(), f * 0.01]).unwrap();
        }

        let restored = VectorIndex::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(restored, index);

        for probe in [[0.0, 1.0, 0.0], [0.5, -0.5, 0.1], [-1.0, 0.0, 0.2]] {
            assert_eq!(
                index.search(&probe, 7).unwrap(),
                restored.search(&probe, 7).unwrap()
            );
        }
    }

    #[test]
    fn test_from_bytes_rejects_damage() {
        let mut index = VectorIndex::new(2).unwrap();
        index.add(&[1.0, 2.0]).unwrap();
        let bytes = index.to_bytes();

        assert!(VectorIndex::from_bytes(&bytes[..10]).is_err());
        assert!(VectorIndex::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(VectorIndex::from_bytes(&bad_magic).is_err());
    }

    #[test]
    fn test_truncate_discards_tail() {
        let mut index = VectorIndex::new(2).unwrap();
        index.add(&[1.0, 1.0]).unwrap();
        index.add(&[2.0, 2.0]).unwrap();
        index.truncate(1);
        assert_eq!(index.len(), 1);
        assert!(index.vector(1).is_none());
    }
}
