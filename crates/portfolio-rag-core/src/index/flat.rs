//! Exact (brute-force) inner-product index.
//!
//! Vectors are kept in one contiguous `Vec<f32>`, row-major. Search scores
//! every row, so results are exact; the corpus is small enough that no
//! approximation is needed.
//!
//! # Byte layout
//!
//! ```text
//! u32 LE  dims
//! u64 LE  count
//! f32 LE  count × dims values
//! ```

use crate::embedding::{blob_to_vec, inner_product, vec_to_blob};
use crate::error::{StoreError, StoreResult};

use super::{NearestNeighborIndex, Neighbor};

const HEADER_LEN: usize = 4 + 8;

/// Flat inner-product index.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
        }
    }

    /// The stored vector at `id`, if any.
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        if id >= self.count() {
            return None;
        }
        let start = id * self.dims;
        Some(&self.data[start..start + self.dims])
    }
}

impl NearestNeighborIndex for FlatIndex {
    fn empty(dims: usize) -> Self {
        Self::new(dims)
    }

    fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(StoreError::Corrupt(format!(
                "index payload is {} bytes, shorter than its header",
                bytes.len()
            )));
        }
        let dims = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[4..HEADER_LEN]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        if dims == 0 {
            return Err(StoreError::Corrupt("index has zero dimensions".to_string()));
        }

        let body = &bytes[HEADER_LEN..];
        let expected = count
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| StoreError::Corrupt("index size overflows".to_string()))?;
        if body.len() != expected {
            return Err(StoreError::Corrupt(format!(
                "index declares {} vectors of {} dims ({} bytes) but holds {} bytes",
                count,
                dims,
                expected,
                body.len()
            )));
        }

        Ok(Self {
            dims,
            data: blob_to_vec(body),
        })
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn count(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> StoreResult<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(StoreError::DimensionMismatch {
                expected: self.dims,
                actual: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dims);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> StoreResult<Vec<Neighbor>> {
        if query.len() != self.dims {
            return Err(StoreError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }
        if k == 0 || self.data.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(id, row)| Neighbor {
                id,
                score: inner_product(query, row),
            })
            .filter(|n| n.score.is_finite())
            .collect();

        // Stable: equal scores keep insertion order.
        neighbors.sort_by(|a, b| b.score.total_cmp(&a.score));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dims);
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.count() as u64).to_le_bytes());
        bytes.extend_from_slice(&vec_to_blob(&self.data));
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(rows: &[[f32; 2]]) -> FlatIndex {
        let mut idx = FlatIndex::new(2);
        let vectors: Vec<Vec<f32>> = rows.iter().map(|r| r.to_vec()).collect();
        idx.add(&vectors).unwrap();
        idx
    }

    #[test]
    fn test_empty_search() {
        let idx = FlatIndex::new(3);
        assert_eq!(idx.count(), 0);
        assert!(idx.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_orders_by_score() {
        let idx = index_with(&[[0.0, 1.0], [1.0, 0.0], [0.6, 0.8]]);
        let hits = idx.search(&[1.0, 0.0], 10).unwrap();
        let ids: Vec<usize> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_search_truncates_to_k() {
        let idx = index_with(&[[1.0, 0.0], [0.9, 0.1], [0.8, 0.2]]);
        assert_eq!(idx.search(&[1.0, 0.0], 2).unwrap().len(), 2);
        assert!(idx.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let idx = index_with(&[[1.0, 0.0], [1.0, 0.0], [1.0, 0.0]]);
        let ids: Vec<usize> = idx
            .search(&[1.0, 0.0], 3)
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_add_rejects_wrong_dims_atomically() {
        let mut idx = index_with(&[[1.0, 0.0]]);
        let err = idx.add(&[vec![0.0, 1.0], vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(idx.count(), 1);
    }

    #[test]
    fn test_truncate() {
        let mut idx = index_with(&[[1.0, 0.0], [0.0, 1.0], [0.5, 0.5]]);
        idx.truncate(1);
        assert_eq!(idx.count(), 1);
        assert_eq!(idx.vector(0), Some(&[1.0f32, 0.0][..]));
        assert_eq!(idx.vector(1), None);
    }

    #[test]
    fn test_bytes_roundtrip_preserves_search() {
        let idx = index_with(&[[0.6, 0.8], [1.0, 0.0]]);
        let restored = FlatIndex::from_bytes(&idx.to_bytes()).unwrap();
        assert_eq!(restored, idx);
        assert_eq!(
            restored.search(&[1.0, 0.0], 2).unwrap(),
            idx.search(&[1.0, 0.0], 2).unwrap()
        );
    }

    #[test]
    fn test_from_bytes_rejects_truncated_body() {
        let idx = index_with(&[[0.6, 0.8], [1.0, 0.0]]);
        let mut bytes = idx.to_bytes();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            FlatIndex::from_bytes(&bytes),
            Err(StoreError::Corrupt(_))
        ));
        assert!(matches!(
            FlatIndex::from_bytes(&[1, 2]),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_non_finite_rows_skipped() {
        let idx = index_with(&[[f32::NAN, 0.0], [0.5, 0.5], [f32::INFINITY, 0.0], [1.0, 0.0]]);
        let hits = idx.search(&[1.0, 0.0], 4).unwrap();
        let ids: Vec<usize> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }
}
