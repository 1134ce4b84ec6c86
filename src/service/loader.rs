//! Startup loading of the search snapshots.
//!
//! Files are read in order of cost: matrix, manifest, mapping, metadata, and
//! the embedding model last, so a bad snapshot fails before the model
//! download starts.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::catalog::{CatalogError, IdentifierMap, MappingPolicy, MetadataStore};
use crate::config::Settings;
use crate::error::{SearchError, SearchResult};
use crate::service::{LoadedIndex, Readiness, SearchService};
use crate::vector::{
    EmbeddingGenerator, EmbeddingMatrix, FastEmbedGenerator, IndexManifest, QueryEncoder,
    VectorIndex,
};

/// How many non-unit rows are listed in the load warning.
const MAX_LOGGED_ROWS: usize = 10;

/// Matrix, identifier map and metadata read from disk.
#[derive(Debug)]
pub struct Snapshots {
    pub index: VectorIndex,
    pub identifiers: IdentifierMap,
    pub metadata: MetadataStore,
}

/// Load every snapshot named in `settings.data`.
pub fn load_snapshots(settings: &Settings) -> SearchResult<Snapshots> {
    let start = Instant::now();

    let embeddings_path = settings.resolve_path(&settings.data.embeddings);
    let matrix = EmbeddingMatrix::load(&embeddings_path)
        .map_err(|e| SearchError::load_vector("embedding matrix", e))?;
    info!(
        "Loaded embedding matrix {} ({} rows x {} dims)",
        embeddings_path.display(),
        matrix.rows(),
        matrix.dimension()
    );

    verify_manifest(settings, &matrix)?;

    let non_unit = matrix.non_unit_rows();
    if !non_unit.is_empty() {
        warn!(
            "{} of {} embedding rows are not unit length; their scores are not cosine similarities. First rows: {:?}",
            non_unit.len(),
            matrix.rows(),
            non_unit
                .iter()
                .take(MAX_LOGGED_ROWS)
                .map(|row| row.get())
                .collect::<Vec<_>>()
        );
    }

    let policy = if settings.data.strict_mapping {
        MappingPolicy::Strict
    } else {
        MappingPolicy::Lenient
    };
    let mapping_path = settings.resolve_path(&settings.data.mapping);
    let identifiers =
        IdentifierMap::load(&mapping_path, policy, matrix.rows()).map_err(|e| match e {
            CatalogError::RowBeyondMatrix { row, rows, .. } => SearchError::RowCountMismatch {
                matrix_rows: rows,
                mapping_rows: (row as usize).saturating_add(1),
            },
            other => SearchError::load_catalog("identifier map", other),
        })?;

    if identifiers.len() != matrix.rows() {
        return Err(SearchError::RowCountMismatch {
            matrix_rows: matrix.rows(),
            mapping_rows: identifiers.len(),
        });
    }

    // Metadata only decorates results; without it names and prefectures are empty
    let metadata_path = settings.resolve_path(&settings.data.metadata);
    let metadata = MetadataStore::load_csv(&metadata_path).unwrap_or_else(|e| {
        error!("Serving without municipality metadata: {e}");
        MetadataStore::new()
    });
    info!(
        "Loaded {} identifiers and {} metadata records in {:?}",
        identifiers.len(),
        metadata.len(),
        start.elapsed()
    );

    Ok(Snapshots {
        index: VectorIndex::new(matrix),
        identifiers,
        metadata,
    })
}

/// Check the matrix against its manifest, if one exists.
fn verify_manifest(settings: &Settings, matrix: &EmbeddingMatrix) -> SearchResult<()> {
    let manifest_path = settings.manifest_path();
    let explicit = settings.data.manifest.is_some();

    if !manifest_path.exists() {
        if explicit {
            return Err(SearchError::load_vector(
                "manifest",
                crate::vector::VectorError::Io {
                    path: manifest_path,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                },
            ));
        }
        return Ok(());
    }

    let manifest =
        IndexManifest::load(&manifest_path).map_err(|e| SearchError::load_vector("manifest", e))?;
    manifest
        .verify(matrix)
        .map_err(|e| SearchError::load_vector("embedding matrix", e))?;

    if let Some(model) = &manifest.model_name {
        if !model.eq_ignore_ascii_case(&settings.model.name) {
            warn!(
                "Manifest records model '{model}' but '{}' is configured for queries",
                settings.model.name
            );
        }
    }
    info!("Embedding matrix matches manifest {}", manifest_path.display());
    Ok(())
}

/// Construct the configured fastembed model.
pub fn create_generator(settings: &Settings) -> SearchResult<Arc<dyn EmbeddingGenerator>> {
    let start = Instant::now();
    let cache_dir = settings.resolve_path(&settings.model.cache_dir);
    let generator = FastEmbedGenerator::new(
        &settings.model.name,
        cache_dir,
        settings.model.show_download_progress,
    )
    .map_err(|e| SearchError::ModelUnavailable(e.to_string()))?;
    info!(
        "Initialized embedding model {} ({} dims) in {:?}",
        settings.model.name,
        generator.dimension(),
        start.elapsed()
    );
    Ok(Arc::new(generator))
}

/// Load snapshots and pair them with an encoder around `generator`.
pub fn load_index_with(
    settings: &Settings,
    generator: Arc<dyn EmbeddingGenerator>,
) -> SearchResult<LoadedIndex> {
    let snapshots = load_snapshots(settings)?;
    build_index(settings, snapshots, generator)
}

/// Load snapshots and the configured model.
pub fn load_index(settings: &Settings) -> SearchResult<LoadedIndex> {
    let snapshots = load_snapshots(settings)?;
    let generator = create_generator(settings)?;
    build_index(settings, snapshots, generator)
}

fn build_index(
    settings: &Settings,
    snapshots: Snapshots,
    generator: Arc<dyn EmbeddingGenerator>,
) -> SearchResult<LoadedIndex> {
    let mut encoder = QueryEncoder::new(generator);
    if !settings.model.query_prefix.is_empty() {
        encoder = encoder.with_query_prefix(settings.model.query_prefix.clone());
    }
    LoadedIndex::new(
        snapshots.index,
        snapshots.identifiers,
        snapshots.metadata,
        encoder,
    )
}

/// Run the startup load and move `service` out of `Loading`.
pub fn initialize(service: &SearchService, settings: &Settings) -> Readiness {
    service.complete(load_index(settings));
    service.readiness()
}

/// As [`initialize`], with an injected embedding generator.
pub fn initialize_with(
    service: &SearchService,
    settings: &Settings,
    generator: Arc<dyn EmbeddingGenerator>,
) -> Readiness {
    service.complete(load_index_with(settings, generator));
    service.readiness()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::service::Query;
    use crate::vector::{MockEmbeddingGenerator, VectorDimension};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const S: f32 = std::f32::consts::FRAC_1_SQRT_2;

    fn write_fixture(dir: &Path) -> Settings {
        let matrix =
            EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![S, S]]).unwrap();
        matrix.save_npy(&dir.join("emb.npy")).unwrap();
        fs::write(
            dir.join("map.json"),
            r#"{"011002": 0, "261009": 1, "292010": 2}"#,
        )
        .unwrap();
        fs::write(
            dir.join("meta.csv"),
            "code,name,prefecture\n011002,札幌市,北海道\n261009,京都市,京都府\n",
        )
        .unwrap();

        let mut settings = Settings::default();
        settings.workspace_root = Some(dir.to_path_buf());
        settings.data.embeddings = "emb.npy".into();
        settings.data.mapping = "map.json".into();
        settings.data.metadata = "meta.csv".into();
        settings
    }

    fn generator() -> Arc<dyn EmbeddingGenerator> {
        Arc::new(
            MockEmbeddingGenerator::with_dimension(VectorDimension::new(2).unwrap())
                .with_vector("north", vec![1.0, 0.0]),
        )
    }

    #[test]
    fn test_initialize_ready() {
        let temp_dir = TempDir::new().unwrap();
        let settings = write_fixture(temp_dir.path());
        let service = SearchService::new(SearchConfig::default());

        let readiness = initialize_with(&service, &settings, generator());
        assert_eq!(readiness, Readiness::Ready);

        let results = service.search(&Query::new("north").with_top_k(2)).unwrap();
        assert_eq!(results[0].code, "011002");
        assert_eq!(results[0].name, "札幌市");
        assert_eq!(results[1].code, "292010");
        assert!(results[1].name.is_empty());
    }

    #[test]
    fn test_missing_matrix_degrades() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = write_fixture(temp_dir.path());
        settings.data.embeddings = "missing.npy".into();
        let service = SearchService::new(SearchConfig::default());

        let readiness = initialize_with(&service, &settings, generator());
        assert_eq!(readiness.name(), "degraded");
        assert!(readiness.reason().unwrap().contains("missing.npy"));
        assert!(service.search(&Query::new("north")).is_err());
    }

    #[test]
    fn test_row_count_mismatch_degrades() {
        let temp_dir = TempDir::new().unwrap();
        let settings = write_fixture(temp_dir.path());
        fs::write(temp_dir.path().join("map.json"), r#"{"011002": 0, "261009": 1}"#).unwrap();

        let err = load_index_with(&settings, generator()).unwrap_err();
        assert!(matches!(
            err,
            SearchError::RowCountMismatch {
                matrix_rows: 3,
                mapping_rows: 2
            }
        ));
    }

    #[test]
    fn test_mapping_row_past_matrix_fails_load() {
        let temp_dir = TempDir::new().unwrap();
        let settings = write_fixture(temp_dir.path());
        fs::write(
            temp_dir.path().join("map.json"),
            r#"{"011002": 0, "261009": 1, "292010": 2, "999999": 4000000000}"#,
        )
        .unwrap();

        let err = load_snapshots(&settings).unwrap_err();
        assert!(matches!(
            err,
            SearchError::RowCountMismatch {
                matrix_rows: 3,
                mapping_rows: 4_000_000_001
            }
        ));
    }

    #[test]
    fn test_manifest_mismatch_fails_load() {
        let temp_dir = TempDir::new().unwrap();
        let settings = write_fixture(temp_dir.path());
        let other = EmbeddingMatrix::from_rows(vec![vec![0.0, 1.0]; 3]).unwrap();
        IndexManifest::for_matrix(&other, None)
            .save(&temp_dir.path().join("manifest.json"))
            .unwrap();

        let err = load_snapshots(&settings).unwrap_err();
        assert_eq!(err.status_code(), "LOAD_ERROR");
        assert!(err.to_string().contains("manifest"), "{err}");
    }

    #[test]
    fn test_matching_manifest_is_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let settings = write_fixture(temp_dir.path());
        let matrix = EmbeddingMatrix::load(&temp_dir.path().join("emb.npy")).unwrap();
        IndexManifest::for_matrix(&matrix, Some("MultilingualE5Small".to_string()))
            .save(&temp_dir.path().join("manifest.json"))
            .unwrap();

        assert!(load_snapshots(&settings).is_ok());
    }

    #[test]
    fn test_explicit_manifest_must_exist() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = write_fixture(temp_dir.path());
        settings.data.manifest = Some("nowhere.json".into());

        assert!(load_snapshots(&settings).is_err());
    }

    #[test]
    fn test_strict_mapping_rejects_gap() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = write_fixture(temp_dir.path());
        fs::write(temp_dir.path().join("map.json"), r#"{"011002": 0, "292010": 2}"#).unwrap();

        // Lenient fills row 1 with UNKNOWN and the row counts agree
        let snapshots = load_snapshots(&settings).unwrap();
        assert_eq!(snapshots.identifiers.unknown_rows(), 1);

        settings.data.strict_mapping = true;
        let err = load_snapshots(&settings).unwrap_err();
        assert_eq!(err.status_code(), "LOAD_ERROR");
    }

    #[test]
    fn test_missing_metadata_still_ready() {
        let temp_dir = TempDir::new().unwrap();
        let settings = write_fixture(temp_dir.path());
        fs::remove_file(temp_dir.path().join("meta.csv")).unwrap();
        let service = SearchService::new(SearchConfig::default());

        assert_eq!(initialize_with(&service, &settings, generator()), Readiness::Ready);
        let results = service.search(&Query::new("north").with_top_k(1)).unwrap();
        assert_eq!(results[0].code, "011002");
        assert!(results[0].name.is_empty());
        assert!(results[0].prefecture.is_empty());
        assert_eq!(service.stats().unwrap().metadata_records, 0);
    }

    #[test]
    fn test_json_matrix_is_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = write_fixture(temp_dir.path());
        fs::write(
            temp_dir.path().join("vectors.json"),
            "[[1.0, 0.0], [0.0, 1.0], [0.0, 1.0]]",
        )
        .unwrap();
        settings.data.embeddings = "vectors.json".into();

        let snapshots = load_snapshots(&settings).unwrap();
        assert_eq!(snapshots.index.len(), 3);
    }
}
