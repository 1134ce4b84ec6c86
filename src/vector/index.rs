//! Exact top-k ranking over the embedding matrix.
//!
//! # Cost
//! Every query is a full scan: O(N·D) multiply-adds to score all rows,
//! followed by an O(N log N) stable sort. With one row per municipality
//! (N ≈ 1,700, D ≤ 1,024) that is well under a millisecond. Corpora a few
//! orders of magnitude larger should move to an approximate index instead
//! of growing this scan.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::vector::{EmbeddingMatrix, RowIndex, VectorDimension, VectorError};

/// Below this many rows scoring stays on the calling thread.
const PARALLEL_SCAN_MIN_ROWS: usize = 4_096;

/// Dot product of two equal-length slices.
///
/// For unit vectors this is their cosine similarity.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Read-only vector index over a loaded [`EmbeddingMatrix`].
///
/// A `VectorIndex` only exists once a matrix has been loaded, so "index not
/// ready" is a state of the owning service, never of the index itself.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    matrix: EmbeddingMatrix,
}

impl VectorIndex {
    #[must_use]
    pub fn new(matrix: EmbeddingMatrix) -> Self {
        Self { matrix }
    }

    /// Ranks all rows against a unit-normalized query vector.
    ///
    /// # Returns
    /// At most `k` `(row, score)` pairs, highest score first. Rows with equal
    /// scores keep their matrix order. `k` larger than the row count returns
    /// every row; `k == 0` or an empty matrix returns nothing.
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if the query length differs from the
    /// matrix dimension.
    pub fn rank(&self, query: &[f32], k: usize) -> Result<Vec<(RowIndex, f32)>, VectorError> {
        self.matrix.dimension().validate_vector(query)?;

        if k == 0 || self.matrix.is_empty() {
            return Ok(Vec::new());
        }

        let scores = self.score_all(query);
        Ok(top_k(scores.into_iter().enumerate(), k))
    }

    /// Ranks all other rows against the stored vector of `row`.
    ///
    /// The row itself is excluded from the result.
    pub fn rank_by_row(
        &self,
        row: RowIndex,
        k: usize,
    ) -> Result<Vec<(RowIndex, f32)>, VectorError> {
        let query = self.matrix.row(row).ok_or(VectorError::RowOutOfRange {
            row: row.as_usize(),
            rows: self.matrix.rows(),
        })?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let scores = self.score_all(query);
        let others = scores
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i != row.as_usize());
        Ok(top_k(others, k))
    }

    /// Scores every row, preserving row order.
    fn score_all(&self, query: &[f32]) -> Vec<f32> {
        let dim = self.matrix.dimension().get();
        let flat = self.matrix.as_flat();

        if self.matrix.rows() >= PARALLEL_SCAN_MIN_ROWS {
            flat.par_chunks_exact(dim)
                .map(|row| dot(query, row))
                .collect()
        } else {
            flat.chunks_exact(dim).map(|row| dot(query, row)).collect()
        }
    }

    #[must_use]
    pub fn matrix(&self) -> &EmbeddingMatrix {
        &self.matrix
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.matrix.rows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.matrix.dimension()
    }
}

/// Stable descending selection of the `k` best scores.
fn top_k(scores: impl Iterator<Item = (usize, f32)>, k: usize) -> Vec<(RowIndex, f32)> {
    let mut ranked: Vec<(RowIndex, f32)> = scores
        .filter_map(|(i, score)| RowIndex::from_usize(i).map(|row| (row, score)))
        .collect();

    // sort_by is stable: equal scores stay in row order
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(k);
    ranked
}
