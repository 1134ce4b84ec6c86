//! Vector search over the frozen municipality embedding matrix.
//!
//! This module owns the embedding matrix, exact top-k ranking over it, and
//! the query encoder that maps free text into the same vector space.
//!
//! # Architecture
//! The matrix is loaded once from an npy (or JSON) snapshot and never
//! mutated. Ranking is an exact dot-product scan; rows and queries are unit
//! vectors, so the dot product is the cosine similarity.

mod embedding;
mod index;
mod manifest;
mod matrix;
mod types;

// Re-export core types for public API
#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{
    EmbeddingGenerator, FastEmbedGenerator, QueryEncoder, normalize_l2, parse_embedding_model,
};
pub use index::{VectorIndex, dot};
pub use manifest::{IndexManifest, MANIFEST_FILE_NAME};
pub use matrix::{EmbeddingMatrix, UNIT_NORM_TOLERANCE};
pub use types::{RowIndex, VectorDimension, VectorError};
