//! Error types for the search service boundary.
//!
//! Lower layers ([`VectorError`], [`CatalogError`]) describe what went wrong
//! with a file or a vector. [`SearchError`] is what callers of the service
//! see: a small taxonomy with stable status codes for JSON responses.

use crate::catalog::CatalogError;
use crate::vector::VectorError;
use thiserror::Error;

/// Errors reported by the search service.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The index has not finished loading, or failed to load.
    #[error("Index not ready (state: {state}){}", reason_suffix(.reason))]
    NotReady {
        state: &'static str,
        reason: Option<String>,
    },

    /// The text-embedding model could not be constructed or failed to encode.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Ranking or result assembly failed for a single request.
    #[error("Search failed: {message}")]
    SearchFailed { message: String },

    /// Request parameters the service cannot act on.
    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// A municipality code that the identifier map does not contain.
    #[error("Municipality code '{code}' not found in the index")]
    CodeNotFound { code: String },

    /// A snapshot file could not be loaded at startup.
    #[error("Failed to load {what}: {source}")]
    Load {
        what: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Matrix and identifier map disagree on the number of rows.
    #[error(
        "Embedding matrix has {matrix_rows} rows but the identifier map covers {mapping_rows}\nSuggestion: Regenerate the matrix and mapping in the same pipeline run"
    )]
    RowCountMismatch {
        matrix_rows: usize,
        mapping_rows: usize,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl SearchError {
    /// Wrap a vector-layer error raised while loading `what`.
    pub fn load_vector(what: &'static str, source: VectorError) -> Self {
        Self::Load {
            what,
            source: Box::new(source),
        }
    }

    /// Wrap a catalog-layer error raised while loading `what`.
    pub fn load_catalog(what: &'static str, source: CatalogError) -> Self {
        Self::Load {
            what,
            source: Box::new(source),
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::NotReady { .. } => "NOT_READY",
            Self::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            Self::SearchFailed { .. } => "SEARCH_FAILED",
            Self::InvalidQuery { .. } => "INVALID_QUERY",
            Self::CodeNotFound { .. } => "CODE_NOT_FOUND",
            Self::Load { .. } => "LOAD_ERROR",
            Self::RowCountMismatch { .. } => "ROW_COUNT_MISMATCH",
            Self::Config { .. } => "CONFIG_ERROR",
        }
        .to_string()
    }

    /// HTTP status that best describes this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotReady { .. } | Self::ModelUnavailable(_) => 503,
            Self::InvalidQuery { .. } => 400,
            Self::CodeNotFound { .. } => 404,
            Self::SearchFailed { .. }
            | Self::Load { .. }
            | Self::RowCountMismatch { .. }
            | Self::Config { .. } => 500,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::NotReady { reason: None, .. } => vec![
                "The index is still loading, retry shortly",
            ],
            Self::NotReady {
                reason: Some(_), ..
            } => vec![
                "Fix the load failure reported above and restart the service",
                "Run 'munisearch info' to check the configured snapshot paths",
            ],
            Self::ModelUnavailable(_) => vec![
                "Check that the model name in [model] is supported",
                "The first start downloads the model, ensure network access or a populated cache_dir",
            ],
            Self::Load { .. } => vec![
                "Check that the paths in [data] point at the pipeline output",
                "Run 'munisearch config' to see the effective paths",
            ],
            Self::RowCountMismatch { .. } => vec![
                "The matrix and mapping come from different pipeline runs",
                "Regenerate both files together",
            ],
            Self::CodeNotFound { .. } => vec![
                "Use the code exactly as it appears in the mapping file",
            ],
            _ => vec![],
        }
    }
}

impl From<VectorError> for SearchError {
    /// Request-time conversion; load paths use [`SearchError::load_vector`].
    fn from(err: VectorError) -> Self {
        Self::SearchFailed {
            message: err.to_string(),
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default()
}

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;
