//! Municipality catalog: identifier mapping and display metadata.

mod identifier;
mod metadata;

pub use identifier::{IdentifierMap, MappingPolicy, UNKNOWN_CODE};
pub use metadata::{MetadataRecord, MetadataStore};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading catalog files.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Mapping file '{path}' is not a JSON object of code to row: {source}")]
    MappingFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Mapping assigns negative or out-of-range rows to codes: {codes:?}")]
    InvalidRow { codes: Vec<String> },

    #[error("Row {row} is assigned to both '{first}' and '{second}'")]
    DuplicateRow {
        row: u32,
        first: String,
        second: String,
    },

    #[error(
        "Code '{code}' maps to row {row}, past the end of the {rows}-row embedding matrix\nSuggestion: Regenerate the matrix and mapping in the same pipeline run"
    )]
    RowBeyondMatrix { code: String, row: u32, rows: usize },

    #[error("Mapping leaves {missing} rows without a code (first missing row: {first})")]
    MappingGap { missing: usize, first: usize },

    #[error("Failed to parse metadata CSV{}: {source}", at(.path))]
    Csv {
        path: Option<PathBuf>,
        source: csv::Error,
    },

    #[error("Metadata CSV{} has no '{column}' column", at(.path))]
    MissingColumn {
        path: Option<PathBuf>,
        column: String,
    },
}

impl CatalogError {
    /// Attach a file path to errors raised while reading from a stream.
    pub(crate) fn with_path(self, file: &Path) -> Self {
        match self {
            Self::Csv { path: None, source } => Self::Csv {
                path: Some(file.to_path_buf()),
                source,
            },
            Self::MissingColumn { path: None, column } => Self::MissingColumn {
                path: Some(file.to_path_buf()),
                column,
            },
            other => other,
        }
    }
}

fn at(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" '{}'", p.display()))
        .unwrap_or_default()
}
