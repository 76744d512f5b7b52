//! Nearest-neighbour index over embedded passages.
//!
//! [`VectorIndex`] is an exact squared-Euclidean index over a dense
//! `ndarray` matrix. Search results are positions into the matrix (and hence
//! into the passage list the matrix was built from), nearest first, with ties
//! broken by position so results are deterministic.
//!
//! [`sync::IndexSynchronizer`] owns the published `(passages, index)` pair and
//! rebuilds it when the fact corpus changes.

pub mod sync;

use anyhow::{ensure, Result};
use ndarray::Array2;

#[derive(Debug, Clone)]
pub struct VectorIndex {
    vectors: Array2<f32>,
}

impl VectorIndex {
    /// Build an index from scratch. Every vector must have `dim` components.
    pub fn build(vectors: &[Vec<f32>], dim: usize) -> Result<Self> {
        let mut flat = Vec::with_capacity(vectors.len() * dim);
        for (i, v) in vectors.iter().enumerate() {
            ensure!(
                v.len() == dim,
                "vector {i} has {} dimensions, expected {dim}",
                v.len()
            );
            flat.extend_from_slice(v);
        }
        let vectors = Array2::from_shape_vec((vectors.len(), dim), flat)?;
        Ok(Self { vectors })
    }

    pub fn empty(dim: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dim)),
        }
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    /// Positions of the `k` nearest vectors, nearest first. `k` is clamped to the index size.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<usize>> {
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        ensure!(
            query.len() == self.dim(),
            "query has {} dimensions, index has {}",
            query.len(),
            self.dim()
        );

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .rows()
            .into_iter()
            .enumerate()
            .map(|(pos, row)| (squared_l2(row.iter(), query), pos))
            .collect();

        let by_distance =
            |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance);

        Ok(scored.into_iter().map(|(_, pos)| pos).collect())
    }
}

fn squared_l2<'a>(row: impl Iterator<Item = &'a f32>, query: &[f32]) -> f32 {
    row.zip(query).map(|(a, b)| (a - b) * (a - b)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i] = 1.0;
        v
    }

    #[test]
    fn search_returns_nearest_first() {
        let vectors = vec![axis(3, 0), axis(3, 1), vec![0.9, 0.1, 0.0]];
        let index = VectorIndex::build(&vectors, 3).unwrap();
        assert_eq!(index.search(&axis(3, 0), 3).unwrap(), vec![0, 2, 1]);
    }

    #[test]
    fn k_is_clamped_to_index_size() {
        let index = VectorIndex::build(&[axis(2, 0), axis(2, 1)], 2).unwrap();
        assert_eq!(index.search(&axis(2, 1), 10).unwrap().len(), 2);
    }

    #[test]
    fn ties_break_by_position() {
        let same = vec![0.5, 0.5];
        let index = VectorIndex::build(&[same.clone(), same.clone(), same], 2).unwrap();
        assert_eq!(index.search(&[0.0, 0.0], 2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = VectorIndex::empty(4);
        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
        // dimension is irrelevant when there is nothing to compare against
        assert!(index.search(&[1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn build_rejects_ragged_vectors() {
        let err = VectorIndex::build(&[vec![1.0, 2.0], vec![1.0]], 2).unwrap_err();
        assert!(err.to_string().contains("vector 1"));
    }

    #[test]
    fn search_rejects_wrong_dimension() {
        let index = VectorIndex::build(&[axis(3, 0)], 3).unwrap();
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }
}
