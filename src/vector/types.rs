//! Type-safe wrappers and core types for the vector index.
//!
//! Row indices and dimensions are wrapped in newtypes so that a row of the
//! embedding matrix can never be confused with a result count or a vector
//! length.

use std::path::PathBuf;
use thiserror::Error;

/// Zero-based position of a vector inside the embedding matrix.
///
/// The row index is the only key that correlates the embedding matrix with
/// the identifier map, so it is kept distinct from plain counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowIndex(u32);

impl RowIndex {
    /// Creates a new `RowIndex`.
    #[must_use]
    pub const fn new(row: u32) -> Self {
        Self(row)
    }

    /// Creates a `RowIndex` from a `usize`, returning `None` if it does not fit.
    #[must_use]
    pub fn from_usize(row: usize) -> Option<Self> {
        u32::try_from(row).ok().map(Self)
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the row as a `usize` suitable for slice indexing.
    #[must_use]
    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for RowIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent dimension
/// mismatches between the encoder and the loaded matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure the query encoder uses the same model that produced the embedding matrix"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Non-finite value in {context} at position {position}\nSuggestion: Regenerate the embeddings; NaN and infinity cannot be ranked"
    )]
    NonFinite {
        context: &'static str,
        position: usize,
    },

    #[error("Failed to read embedding snapshot '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "Invalid embedding snapshot '{path}': {reason}\nSuggestion: Export the matrix as a 2-D little-endian float32 .npy file"
    )]
    InvalidFormat { path: PathBuf, reason: String },

    #[error(
        "Embedding snapshot does not match its manifest: {reason}\nSuggestion: Regenerate the matrix, mapping and manifest in the same pipeline run"
    )]
    ManifestMismatch { reason: String },

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error("Row {row} is outside the embedding matrix ({rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },
}
