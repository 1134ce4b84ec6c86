//! Row index ↔ municipality code mapping.
//!
//! The snapshot is a JSON object `{ code: row }` written by the embedding
//! pipeline. It is inverted into a dense `row → code` table covering
//! `0..=max(row)`. Rows at or past the end of the embedding matrix are
//! rejected before the table is allocated.
//!
//! # Gap policy
//! By default the build is lenient: rows inside the range that no code maps
//! to are filled with [`UNKNOWN_CODE`], duplicate rows keep the code that
//! sorts first, and negative rows are skipped. Every repair is logged.
//! [`MappingPolicy::Strict`] turns each of them into a load error instead.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::warn;

use crate::catalog::CatalogError;
use crate::vector::RowIndex;

/// Code reported for a row the mapping does not cover.
pub const UNKNOWN_CODE: &str = "UNKNOWN";

/// How many offending rows are listed in a single log line.
const MAX_LOGGED_ROWS: usize = 10;

/// What to do when the mapping snapshot is not a clean bijection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MappingPolicy {
    /// Repair and log.
    #[default]
    Lenient,
    /// Reject the snapshot.
    Strict,
}

/// Dense row → code table with a reverse index.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    codes: Vec<String>,
    rows_by_code: HashMap<String, RowIndex>,
    unknown_rows: usize,
}

impl IdentifierMap {
    /// Build from a code → row mapping over a matrix of `matrix_rows` rows.
    pub fn from_code_rows(
        mapping: BTreeMap<String, i64>,
        policy: MappingPolicy,
        matrix_rows: usize,
    ) -> Result<Self, CatalogError> {
        let mut negative = Vec::new();
        let mut by_row: BTreeMap<u32, String> = BTreeMap::new();
        let mut duplicates = Vec::new();

        // BTreeMap iterates codes in sorted order, so the first code wins a duplicate row
        for (code, row) in mapping {
            let Ok(row) = u32::try_from(row) else {
                negative.push(code);
                continue;
            };
            if let Some(existing) = by_row.get(&row) {
                duplicates.push((row, existing.clone(), code));
                continue;
            }
            by_row.insert(row, code);
        }

        if !negative.is_empty() {
            if policy == MappingPolicy::Strict {
                return Err(CatalogError::InvalidRow { codes: negative });
            }
            warn!(
                "Skipped {} codes with out-of-range row indices: {:?}",
                negative.len(),
                &negative[..negative.len().min(MAX_LOGGED_ROWS)]
            );
        }

        if !duplicates.is_empty() {
            if policy == MappingPolicy::Strict {
                let (row, first, second) = duplicates.swap_remove(0);
                return Err(CatalogError::DuplicateRow { row, first, second });
            }
            for (row, kept, dropped) in duplicates.iter().take(MAX_LOGGED_ROWS) {
                warn!("Row {row} is claimed by '{kept}' and '{dropped}', keeping '{kept}'");
            }
        }

        if let Some((&row, code)) = by_row.last_key_value() {
            if row as usize >= matrix_rows {
                return Err(CatalogError::RowBeyondMatrix {
                    code: code.clone(),
                    row,
                    rows: matrix_rows,
                });
            }
        }

        let len = by_row
            .last_key_value()
            .map(|(row, _)| *row as usize + 1)
            .unwrap_or(0);

        let mut codes = vec![UNKNOWN_CODE.to_string(); len];
        let mut rows_by_code = HashMap::with_capacity(by_row.len());
        for (row, code) in by_row {
            rows_by_code.insert(code.clone(), RowIndex::new(row));
            codes[row as usize] = code;
        }

        let gaps: Vec<usize> = codes
            .iter()
            .enumerate()
            .filter(|(_, code)| code.as_str() == UNKNOWN_CODE)
            .map(|(row, _)| row)
            .collect();

        if !gaps.is_empty() {
            if policy == MappingPolicy::Strict {
                return Err(CatalogError::MappingGap {
                    missing: gaps.len(),
                    first: gaps[0],
                });
            }
            warn!(
                "Mapping leaves {} of {} rows without a code; they resolve to {UNKNOWN_CODE}. First rows: {:?}",
                gaps.len(),
                len,
                &gaps[..gaps.len().min(MAX_LOGGED_ROWS)]
            );
        }

        Ok(Self {
            codes,
            rows_by_code,
            unknown_rows: gaps.len(),
        })
    }

    /// Load and build from a JSON snapshot file.
    pub fn load(
        path: &Path,
        policy: MappingPolicy,
        matrix_rows: usize,
    ) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mapping: BTreeMap<String, i64> =
            serde_json::from_str(&json).map_err(|source| CatalogError::MappingFormat {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_code_rows(mapping, policy, matrix_rows)
    }

    /// Code for a row; [`UNKNOWN_CODE`] if outside the built range.
    #[must_use]
    pub fn resolve(&self, row: RowIndex) -> &str {
        self.codes
            .get(row.as_usize())
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CODE)
    }

    /// Row for a code, if the mapping contains it.
    #[must_use]
    pub fn row_of(&self, code: &str) -> Option<RowIndex> {
        self.rows_by_code.get(code).copied()
    }

    /// Number of rows covered (`max(row) + 1`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Rows filled with [`UNKNOWN_CODE`] during the build.
    #[must_use]
    pub fn unknown_rows(&self) -> usize {
        self.unknown_rows
    }
}
