//! Search service: query text in, ranked municipalities out.
//!
//! The service owns one immutable [`LoadedIndex`] once startup loading
//! finishes. Until then, and forever after a failed load, every request is
//! answered with [`SearchError::NotReady`].
//!
//! # Readiness
//!
//! ```text
//! Loading ──┬──> Ready
//!           └──> Degraded { reason }
//! ```
//!
//! The transition happens exactly once. Reads never take a lock.

pub mod loader;

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::catalog::{IdentifierMap, MetadataStore};
use crate::config::SearchConfig;
use crate::error::{SearchError, SearchResult};
use crate::vector::{QueryEncoder, RowIndex, VectorIndex};

/// A free-text search request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Query {
    pub text: String,

    /// Number of results; the configured default when `None`.
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Drop results scoring below this value.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: None,
            min_score: None,
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// One ranked municipality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub code: String,
    pub score: f32,
    pub name: String,
    pub prefecture: String,
}

/// Everything a ready service searches over.
#[derive(Debug)]
pub struct LoadedIndex {
    index: VectorIndex,
    identifiers: IdentifierMap,
    metadata: MetadataStore,
    encoder: QueryEncoder,
}

impl LoadedIndex {
    /// Assemble a loaded index, checking that its parts agree.
    ///
    /// # Errors
    /// - `RowCountMismatch` if the identifier map does not cover exactly the
    ///   matrix rows
    /// - `ModelUnavailable` if the encoder dimension differs from the matrix
    pub fn new(
        index: VectorIndex,
        identifiers: IdentifierMap,
        metadata: MetadataStore,
        encoder: QueryEncoder,
    ) -> SearchResult<Self> {
        if identifiers.len() != index.len() {
            return Err(SearchError::RowCountMismatch {
                matrix_rows: index.len(),
                mapping_rows: identifiers.len(),
            });
        }

        encoder.check_dimension(index.dimension()).map_err(|e| {
            SearchError::ModelUnavailable(format!(
                "model '{}' does not match the embedding matrix: {e}",
                encoder.model_name()
            ))
        })?;

        Ok(Self {
            index,
            identifiers,
            metadata,
            encoder,
        })
    }

    #[must_use]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[must_use]
    pub fn identifiers(&self) -> &IdentifierMap {
        &self.identifiers
    }

    #[must_use]
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            rows: self.index.len(),
            dimension: self.index.dimension().get(),
            fingerprint: self.index.matrix().fingerprint().to_string(),
            unknown_rows: self.identifiers.unknown_rows(),
            metadata_records: self.metadata.len(),
            model_name: self.encoder.model_name().to_string(),
        }
    }

    /// Join ranked rows with their codes and metadata.
    fn assemble(&self, ranked: Vec<(RowIndex, f32)>, min_score: Option<f32>) -> Vec<ScoredResult> {
        ranked
            .into_iter()
            .take_while(|(_, score)| min_score.is_none_or(|min| *score >= min))
            .map(|(row, score)| {
                let code = self.identifiers.resolve(row);
                let record = self.metadata.describe(code);
                ScoredResult {
                    code: code.to_string(),
                    score,
                    name: record.name.clone(),
                    prefecture: record.prefecture.clone(),
                }
            })
            .collect()
    }
}

/// Summary of the loaded index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub rows: usize,
    pub dimension: usize,
    pub fingerprint: String,
    pub unknown_rows: usize,
    pub metadata_records: usize,
    pub model_name: String,
}

/// Readiness of a [`SearchService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Readiness {
    Loading,
    Ready,
    Degraded { reason: String },
}

impl Readiness {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Degraded { .. } => "degraded",
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Degraded { reason } => Some(reason.as_str()),
            _ => None,
        }
    }
}

enum LoadOutcome {
    Ready(Box<LoadedIndex>),
    Degraded(String),
}

/// Thread-safe search front end over a [`LoadedIndex`].
pub struct SearchService {
    outcome: OnceLock<LoadOutcome>,
    limits: SearchConfig,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("readiness", &self.readiness())
            .field("limits", &self.limits)
            .finish()
    }
}

impl SearchService {
    /// A service in the `Loading` state.
    #[must_use]
    pub fn new(limits: SearchConfig) -> Self {
        Self {
            outcome: OnceLock::new(),
            limits,
        }
    }

    /// A service that is `Ready` from the start.
    #[must_use]
    pub fn with_index(index: LoadedIndex, limits: SearchConfig) -> Self {
        let service = Self::new(limits);
        service.mark_ready(index);
        service
    }

    /// Transition to `Ready`. Returns `false` if already transitioned.
    pub fn mark_ready(&self, index: LoadedIndex) -> bool {
        self.transition(LoadOutcome::Ready(Box::new(index)))
    }

    /// Transition to `Degraded`. Returns `false` if already transitioned.
    pub fn mark_degraded(&self, reason: impl Into<String>) -> bool {
        self.transition(LoadOutcome::Degraded(reason.into()))
    }

    /// Record the result of a load attempt.
    pub fn complete(&self, result: SearchResult<LoadedIndex>) -> bool {
        match result {
            Ok(index) => self.mark_ready(index),
            Err(e) => {
                error!("Search index failed to load: {e}");
                self.mark_degraded(e.to_string())
            }
        }
    }

    fn transition(&self, outcome: LoadOutcome) -> bool {
        let accepted = self.outcome.set(outcome).is_ok();
        if !accepted {
            warn!("Ignoring second readiness transition; state is {}", self.readiness().name());
        }
        accepted
    }

    #[must_use]
    pub fn readiness(&self) -> Readiness {
        match self.outcome.get() {
            None => Readiness::Loading,
            Some(LoadOutcome::Ready(_)) => Readiness::Ready,
            Some(LoadOutcome::Degraded(reason)) => Readiness::Degraded {
                reason: reason.clone(),
            },
        }
    }

    #[must_use]
    pub fn limits(&self) -> &SearchConfig {
        &self.limits
    }

    /// Index summary, once ready.
    #[must_use]
    pub fn stats(&self) -> Option<IndexStats> {
        self.loaded().ok().map(LoadedIndex::stats)
    }

    fn loaded(&self) -> SearchResult<&LoadedIndex> {
        match self.outcome.get() {
            Some(LoadOutcome::Ready(index)) => Ok(index),
            Some(LoadOutcome::Degraded(reason)) => Err(SearchError::NotReady {
                state: "degraded",
                reason: Some(reason.clone()),
            }),
            None => Err(SearchError::NotReady {
                state: "loading",
                reason: None,
            }),
        }
    }

    /// Rank municipalities against free text.
    ///
    /// # Errors
    /// - `NotReady` unless the service is `Ready`
    /// - `InvalidQuery` for a non-finite `min_score`
    /// - `SearchFailed` if encoding or ranking fails
    pub fn search(&self, query: &Query) -> SearchResult<Vec<ScoredResult>> {
        let loaded = self.loaded()?;
        if query.min_score.is_some_and(|min| !min.is_finite()) {
            return Err(SearchError::InvalidQuery {
                reason: "min_score must be a finite number".to_string(),
            });
        }

        let k = self.limits.effective_top_k(query.top_k);
        debug!("search: {:?} top_k={k}", query.text);

        let vector = loaded.encoder.encode(&query.text).map_err(|e| {
            error!("Failed to encode query {:?}: {e}", query.text);
            SearchError::from(e)
        })?;

        let ranked = loaded.index.rank(&vector, k).map_err(|e| {
            error!("Failed to rank query {:?}: {e}", query.text);
            SearchError::from(e)
        })?;

        Ok(loaded.assemble(ranked, query.min_score))
    }

    /// Rank municipalities against a stored municipality, excluding itself.
    ///
    /// # Errors
    /// - `NotReady` unless the service is `Ready`
    /// - `CodeNotFound` if `code` is not in the identifier map
    pub fn similar(&self, code: &str, top_k: Option<usize>) -> SearchResult<Vec<ScoredResult>> {
        let loaded = self.loaded()?;
        let row = loaded
            .identifiers
            .row_of(code)
            .ok_or_else(|| SearchError::CodeNotFound {
                code: code.to_string(),
            })?;

        let k = self.limits.effective_top_k(top_k);
        debug!("similar: {code} (row {row}) top_k={k}");

        let ranked = loaded.index.rank_by_row(row, k).map_err(|e| {
            error!("Failed to rank neighbours of {code}: {e}");
            SearchError::from(e)
        })?;

        Ok(loaded.assemble(ranked, None))
    }
}
