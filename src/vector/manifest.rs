//! Optional integrity manifest written next to the embedding matrix.
//!
//! The matrix and the identifier map are correlated only by row order, so a
//! pipeline run may record what it produced. When a manifest is present the
//! loader refuses a matrix that does not match it.

use crate::vector::{EmbeddingMatrix, VectorError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default file name of the manifest.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Shape and content fingerprint of one embedding generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Number of rows in the matrix (and entries in the mapping)
    pub rows: usize,

    /// Dimension of every row
    pub dimension: usize,

    /// Hex SHA-256 of the little-endian float32 payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Name of the model that produced the embeddings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl IndexManifest {
    /// Describe an existing matrix.
    pub fn for_matrix(matrix: &EmbeddingMatrix, model_name: Option<String>) -> Self {
        Self {
            rows: matrix.rows(),
            dimension: matrix.dimension().get(),
            sha256: Some(matrix.fingerprint().to_string()),
            model_name,
        }
    }

    /// Load a manifest from a JSON file
    pub fn load(path: &Path) -> Result<Self, VectorError> {
        let json = std::fs::read_to_string(path).map_err(|source| VectorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|e| VectorError::InvalidFormat {
            path: path.to_path_buf(),
            reason: format!("manifest is not valid JSON: {e}"),
        })
    }

    /// Save the manifest as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), VectorError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| VectorError::InvalidFormat {
            path: path.to_path_buf(),
            reason: format!("failed to serialize manifest: {e}"),
        })?;
        std::fs::write(path, json).map_err(|source| VectorError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check a loaded matrix against this manifest.
    pub fn verify(&self, matrix: &EmbeddingMatrix) -> Result<(), VectorError> {
        if self.rows != matrix.rows() {
            return Err(VectorError::ManifestMismatch {
                reason: format!(
                    "manifest records {} rows, matrix has {}",
                    self.rows,
                    matrix.rows()
                ),
            });
        }
        if self.dimension != matrix.dimension().get() {
            return Err(VectorError::ManifestMismatch {
                reason: format!(
                    "manifest records dimension {}, matrix has {}",
                    self.dimension,
                    matrix.dimension()
                ),
            });
        }
        if let Some(expected) = &self.sha256 {
            if !expected.eq_ignore_ascii_case(matrix.fingerprint()) {
                return Err(VectorError::ManifestMismatch {
                    reason: format!(
                        "content fingerprint {} does not match manifest {expected}",
                        matrix.fingerprint()
                    ),
                });
            }
        }
        Ok(())
    }
}
