//! In-memory nearest-neighbour index over chunk vectors.
//!
//! Position `i` in the index always corresponds to metadata entry `i`.

use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::models::ScoreKind;
use crate::services::vectorizer::{QueryVector, SparseVector};

/// A ranked match: index position and score.
pub type Neighbor = (usize, f32);

/// Rows of a fitted TF-IDF matrix. Scored by dot product (cosine, since rows
/// are unit length); higher is better.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseIndex {
    rows: Vec<SparseVector>,
}

/// Exhaustive dense index in a row-major buffer. Scored by squared
/// Euclidean distance; lower is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VectorIndex {
    Sparse(SparseIndex),
    Flat(FlatIndex),
}

impl SparseIndex {
    pub fn from_rows(rows: Vec<SparseVector>) -> Self {
        Self { rows }
    }

    fn search(&self, query: &SparseVector, k: usize) -> Vec<Neighbor> {
        let mut scored: Vec<Neighbor> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i, row.dot(query)))
            .collect();
        // Stable: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored.retain(|(_, score)| *score > 0.0);
        scored
    }
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimension.max(1)
    }

    fn check_dimension(&self, v: &[f32]) -> Result<(), IndexError> {
        if v.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: v.len(),
            });
        }
        Ok(())
    }

    fn add(&mut self, v: &[f32]) -> Result<usize, IndexError> {
        self.check_dimension(v)?;
        let position = self.len();
        self.data.extend_from_slice(v);
        Ok(position)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_dimension(query)?;
        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(i, row)| {
                let distance = row
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>();
                (i, distance)
            })
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        Ok(scored)
    }
}

impl VectorIndex {
    pub fn sparse(rows: Vec<SparseVector>) -> Self {
        VectorIndex::Sparse(SparseIndex::from_rows(rows))
    }

    pub fn flat(dimension: usize) -> Self {
        VectorIndex::Flat(FlatIndex::new(dimension))
    }

    pub fn len(&self) -> usize {
        match self {
            VectorIndex::Sparse(index) => index.rows.len(),
            VectorIndex::Flat(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn score_kind(&self) -> ScoreKind {
        match self {
            VectorIndex::Sparse(_) => ScoreKind::Similarity,
            VectorIndex::Flat(_) => ScoreKind::Distance,
        }
    }

    /// Append one vector and return its position.
    pub fn add(&mut self, vector: QueryVector) -> Result<usize, IndexError> {
        match (self, vector) {
            (VectorIndex::Sparse(index), QueryVector::Sparse(row)) => {
                index.rows.push(row);
                Ok(index.rows.len() - 1)
            }
            (VectorIndex::Flat(index), QueryVector::Dense(v)) => index.add(&v),
            (_, vector) => Err(IndexError::KindMismatch(vector.kind())),
        }
    }

    /// Best `min(k, len)` matches, best first; ties keep insertion order.
    /// Sparse results additionally drop non-positive similarities.
    pub fn search(&self, query: &QueryVector, k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        match (self, query) {
            (VectorIndex::Sparse(index), QueryVector::Sparse(q)) => Ok(index.search(q, k)),
            (VectorIndex::Flat(index), QueryVector::Dense(q)) => index.search(q, k),
            (_, query) => Err(IndexError::KindMismatch(query.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse(pairs: &[(u32, f32)]) -> QueryVector {
        QueryVector::Sparse(SparseVector {
            indices: pairs.iter().map(|p| p.0).collect(),
            values: pairs.iter().map(|p| p.1).collect(),
        })
    }

    fn flat_with(rows: &[[f32; 2]]) -> VectorIndex {
        let mut index = VectorIndex::flat(2);
        for row in rows {
            index.add(QueryVector::Dense(row.to_vec())).unwrap();
        }
        index
    }

    #[test]
    fn test_add_returns_positions() {
        let mut index = VectorIndex::flat(2);
        assert_eq!(index.add(QueryVector::Dense(vec![0.0, 1.0])).unwrap(), 0);
        assert_eq!(index.add(QueryVector::Dense(vec![1.0, 0.0])).unwrap(), 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_flat_search_orders_by_distance() {
        let index = flat_with(&[[0.0, 0.0], [3.0, 4.0], [1.0, 0.0]]);
        let hits = index.search(&QueryVector::Dense(vec![0.9, 0.0]), 5).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(positions, vec![2, 0, 1]);
        assert!((hits[0].1 - 0.01).abs() < 1e-5);
        assert!((hits[2].1 - 20.41).abs() < 1e-3);
    }

    #[test]
    fn test_flat_ties_prefer_earlier_insertion() {
        let index = flat_with(&[[1.0, 0.0], [0.0, 1.0], [1.0, 0.0]]);
        let hits = index.search(&QueryVector::Dense(vec![1.0, 0.0]), 2).unwrap();
        assert_eq!(hits, vec![(0, 0.0), (2, 0.0)]);
    }

    #[test]
    fn test_sparse_ties_prefer_earlier_insertion() {
        let row = |pairs: &[(u32, f32)]| SparseVector {
            indices: pairs.iter().map(|p| p.0).collect(),
            values: pairs.iter().map(|p| p.1).collect(),
        };
        let index = VectorIndex::sparse(vec![
            row(&[(0, 0.5)]),
            row(&[(0, 1.0)]),
            row(&[(1, 1.0)]),
            row(&[(0, 1.0)]),
        ]);
        let hits = index.search(&sparse(&[(0, 1.0)]), 10).unwrap();
        assert_eq!(hits, vec![(1, 1.0), (3, 1.0), (0, 0.5)]);
    }

    #[test]
    fn test_sparse_search_drops_non_positive() {
        let index = VectorIndex::sparse(vec![
            SparseVector {
                indices: vec![0],
                values: vec![1.0],
            },
            SparseVector {
                indices: vec![1],
                values: vec![1.0],
            },
            SparseVector {
                indices: vec![0, 1],
                values: vec![0.6, 0.8],
            },
        ]);
        let hits = index.search(&sparse(&[(1, 1.0)]), 10).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(positions, vec![1, 2]);
        assert!(hits.iter().all(|h| h.1 > 0.0));
    }

    #[test]
    fn test_k_zero_and_empty_index() {
        let index = flat_with(&[[1.0, 0.0]]);
        assert!(index.search(&QueryVector::Dense(vec![1.0, 0.0]), 0).unwrap().is_empty());

        let empty = VectorIndex::sparse(Vec::new());
        assert!(empty.search(&sparse(&[(0, 1.0)]), 5).unwrap().is_empty());
    }

    #[test]
    fn test_result_count_capped_by_len() {
        let index = flat_with(&[[1.0, 0.0], [0.0, 1.0]]);
        assert_eq!(index.search(&QueryVector::Dense(vec![0.0, 0.0]), 10).unwrap().len(), 2);
    }

    #[test]
    fn test_kind_and_dimension_mismatch() {
        let mut index = VectorIndex::flat(2);
        assert!(matches!(
            index.add(sparse(&[(0, 1.0)])),
            Err(IndexError::KindMismatch("sparse"))
        ));
        assert!(matches!(
            index.add(QueryVector::Dense(vec![1.0])),
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
        index.add(QueryVector::Dense(vec![1.0, 1.0])).unwrap();
        assert!(index.search(&QueryVector::Dense(vec![1.0, 1.0, 1.0]), 1).is_err());
    }
}
