//! Display attributes for municipalities, keyed by code.
//!
//! Loaded from the cleaned municipality CSV. Only the `code`, `name` and
//! `prefecture` columns are read; other columns are ignored.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CatalogError;

/// Columns the metadata table must provide.
const REQUIRED_COLUMNS: [&str; 3] = ["code", "name", "prefecture"];

/// Name and prefecture of one municipality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub name: String,
    pub prefecture: String,
}

static EMPTY_RECORD: MetadataRecord = MetadataRecord {
    name: String::new(),
    prefecture: String::new(),
};

/// Code → [`MetadataRecord`] lookup.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    records: HashMap<String, MetadataRecord>,
}

impl MetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `code`.
    pub fn insert(&mut self, code: impl Into<String>, record: MetadataRecord) {
        self.records.insert(code.into(), record);
    }

    /// Load from a CSV file with a header row.
    pub fn load_csv(path: &Path) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file).map_err(|e| e.with_path(path))
    }

    /// Read CSV from any reader. Later rows replace earlier rows with the same code.
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|source| CatalogError::Csv {
                path: None,
                source,
            })?
            .clone();

        let mut positions = [0usize; 3];
        for (slot, column) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(column))
                .ok_or_else(|| CatalogError::MissingColumn {
                    path: None,
                    column: column.to_string(),
                })?;
        }
        let [code_at, name_at, prefecture_at] = positions;

        let mut store = Self::new();
        let mut replaced = 0usize;
        for record in csv_reader.records() {
            let record = record.map_err(|source| CatalogError::Csv {
                path: None,
                source,
            })?;

            let code = record.get(code_at).unwrap_or_default();
            if code.is_empty() {
                continue;
            }
            let entry = MetadataRecord {
                name: record.get(name_at).unwrap_or_default().to_string(),
                prefecture: record.get(prefecture_at).unwrap_or_default().to_string(),
            };
            if store.records.insert(code.to_string(), entry).is_some() {
                replaced += 1;
            }
        }

        if replaced > 0 {
            debug!("Metadata table repeats {replaced} codes; later rows replaced earlier ones");
        }

        Ok(store)
    }

    /// Record for `code`; empty name and prefecture if absent.
    #[must_use]
    pub fn describe(&self, code: &str) -> &MetadataRecord {
        self.records.get(code).unwrap_or(&EMPTY_RECORD)
    }

    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.records.contains_key(code)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
