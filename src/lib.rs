//! Semantic nearest-neighbor search over municipality embeddings.
//!
//! A frozen embedding matrix, a code ↔ row mapping and a metadata table are
//! loaded once at startup. Free-text queries are encoded into the same vector
//! space and ranked by cosine similarity.

pub mod catalog;
pub mod config;
pub mod display;
pub mod error;
pub mod http;
pub mod service;
pub mod vector;

// Explicit exports for better API clarity
pub use catalog::{
    CatalogError, IdentifierMap, MappingPolicy, MetadataRecord, MetadataStore, UNKNOWN_CODE,
};
pub use config::Settings;
pub use error::{SearchError, SearchResult};
pub use service::{IndexStats, LoadedIndex, Query, Readiness, ScoredResult, SearchService};
pub use vector::{
    EmbeddingGenerator, EmbeddingMatrix, IndexManifest, QueryEncoder, RowIndex, VectorDimension,
    VectorError, VectorIndex,
};
