//! Load failures move the service to `Degraded` instead of serving bad data.

use crate::common::{BrokenGenerator, KeywordGenerator, TestProject, loaded_service};
use munisearch::service::loader;
use munisearch::{EmbeddingMatrix, IndexManifest, Query, Readiness, SearchError};
use std::sync::Arc;

fn assert_degraded(readiness: &Readiness, needle: &str) {
    match readiness {
        Readiness::Degraded { reason } => {
            assert!(reason.contains(needle), "reason {reason:?} lacks {needle:?}")
        }
        other => panic!("expected degraded, got {other:?}"),
    }
}

#[test]
fn test_missing_matrix_degrades_with_reason() {
    let project = TestProject::new();
    project.add_file("map.json", r#"{"A": 0}"#);
    project.add_file("meta.csv", "code,name,prefecture\n");

    let service = loaded_service(&project, KeywordGenerator::compass());

    assert_degraded(&service.readiness(), "emb.npy");
    let err = service.search(&Query::new("east")).unwrap_err();
    assert!(matches!(err, SearchError::NotReady { state: "degraded", .. }));
    assert!(err.to_string().contains("emb.npy"));
}

#[test]
fn test_row_count_mismatch_degrades() {
    let project = TestProject::scenario();
    project.add_file("map.json", r#"{"A": 0, "B": 1, "C": 2, "D": 3}"#);

    let service = loaded_service(&project, KeywordGenerator::compass());
    assert_degraded(&service.readiness(), "3 rows");
}

#[test]
fn test_corrupt_mapping_row_degrades() {
    let project = TestProject::scenario();
    project.add_file("map.json", r#"{"A": 0, "B": 1, "C": 2, "X": 4000000000}"#);

    let service = loaded_service(&project, KeywordGenerator::compass());
    assert_degraded(&service.readiness(), "identifier map covers 4000000001");
}

#[test]
fn test_manifest_fingerprint_mismatch_degrades() {
    let project = TestProject::scenario();
    let stale = EmbeddingMatrix::from_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]])
        .unwrap();
    IndexManifest::for_matrix(&stale, None)
        .save(&project.path().join("manifest.json"))
        .unwrap();

    let service = loaded_service(&project, KeywordGenerator::compass());
    assert_degraded(&service.readiness(), "manifest");
}

#[test]
fn test_strict_mapping_rejects_gap() {
    let project = TestProject::scenario();
    project.add_file("map.json", r#"{"A": 0, "C": 2}"#);
    let mut settings = project.settings();
    settings.data.strict_mapping = true;

    let err = loader::load_index_with(&settings, KeywordGenerator::compass()).unwrap_err();
    assert_eq!(err.status_code(), "LOAD_ERROR");
    assert!(err.to_string().contains("without a code"), "{err}");
}

#[test]
fn test_encoder_dimension_mismatch_degrades() {
    let project = TestProject::scenario();
    let service = loaded_service(&project, Arc::new(KeywordGenerator::new(3)));
    assert_degraded(&service.readiness(), "does not match");
}

#[test]
fn test_bad_metadata_serves_without_names() {
    let project = TestProject::scenario();
    project.add_file("meta.csv", "code,name\nA,Alpha\n");

    let service = loaded_service(&project, KeywordGenerator::compass());
    assert_eq!(service.readiness(), Readiness::Ready);

    let results = service.search(&Query::new("east").with_top_k(1)).unwrap();
    assert_eq!(results[0].code, "A");
    assert_eq!(results[0].name, "");
    assert_eq!(results[0].prefecture, "");
}

#[test]
fn test_missing_metadata_file_serves_without_names() {
    let project = TestProject::scenario();
    std::fs::remove_file(project.path().join("meta.csv")).unwrap();

    let service = loaded_service(&project, KeywordGenerator::compass());
    assert_eq!(service.readiness(), Readiness::Ready);
    assert_eq!(service.stats().unwrap().metadata_records, 0);

    let results = service.search(&Query::new("north").with_top_k(1)).unwrap();
    assert_eq!(results[0].code, "B");
    assert_eq!(results[0].name, "");
}

#[test]
fn test_encoder_failure_at_request_time() {
    let project = TestProject::scenario();
    let service = loaded_service(&project, Arc::new(BrokenGenerator));
    assert_eq!(service.readiness(), Readiness::Ready);

    let err = service.search(&Query::new("east")).unwrap_err();
    assert!(matches!(err, SearchError::SearchFailed { .. }));
    assert_eq!(err.status_code(), "SEARCH_FAILED");
    assert_eq!(err.http_status(), 500);
    assert!(err.to_string().contains("inference session closed"));

    // The service itself stays ready
    assert_eq!(service.readiness(), Readiness::Ready);
}
