//! End-to-end search over snapshot files on disk.

use crate::common::{KeywordGenerator, S, TestProject, loaded_service};
use munisearch::config::SearchConfig;
use munisearch::{Query, Readiness, SearchError, SearchService};

#[test]
fn test_ranks_east_query() {
    let project = TestProject::scenario();
    let service = loaded_service(&project, KeywordGenerator::compass());
    assert_eq!(service.readiness(), Readiness::Ready);

    let results = service.search(&Query::new("east").with_top_k(2)).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].code, "A");
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert_eq!(results[1].code, "C");
    assert!((results[1].score - S).abs() < 1e-5);
}

#[test]
fn test_search_before_load_reports_loading() {
    let service = SearchService::new(SearchConfig::default());

    let err = service.search(&Query::new("east")).unwrap_err();
    assert_eq!(err.status_code(), "NOT_READY");
    assert!(matches!(err, SearchError::NotReady { state: "loading", .. }));
}

#[test]
fn test_top_k_larger_than_rows_returns_all_ranked() {
    let project = TestProject::scenario();
    let service = loaded_service(&project, KeywordGenerator::compass());

    let results = service.search(&Query::new("north").with_top_k(10)).unwrap();
    let codes: Vec<&str> = results.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["B", "C", "A"]);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn test_row_without_metadata_is_kept() {
    let project = TestProject::scenario();
    let service = loaded_service(&project, KeywordGenerator::compass());

    // C has a matrix row but no metadata record
    let results = service.search(&Query::new("north-east").with_top_k(1)).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].code, "C");
    assert_eq!(results[0].name, "");
    assert_eq!(results[0].prefecture, "");
    assert!((results[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn test_metadata_join() {
    let project = TestProject::scenario();
    let service = loaded_service(&project, KeywordGenerator::compass());

    let results = service.search(&Query::new("north").with_top_k(1)).unwrap();
    assert_eq!(results[0].code, "B");
    assert_eq!(results[0].name, "Beta City");
    assert_eq!(results[0].prefecture, "Kyoto");
}

#[test]
fn test_mapping_gap_surfaces_unknown_code() {
    let project = TestProject::scenario();
    project.add_file("map.json", r#"{"A": 0, "C": 2}"#);
    let service = loaded_service(&project, KeywordGenerator::compass());

    let results = service.search(&Query::new("north").with_top_k(1)).unwrap();
    assert_eq!(results[0].code, munisearch::UNKNOWN_CODE);
    assert_eq!(service.stats().unwrap().unknown_rows, 1);
}

#[test]
fn test_default_top_k_is_five() {
    let project = TestProject::new();
    let rows: Vec<Vec<f32>> = (0..8)
        .map(|i| {
            let angle = i as f32 * 0.2;
            vec![angle.cos(), angle.sin()]
        })
        .collect();
    project.write_matrix(rows);
    let mapping: Vec<String> = (0..8).map(|i| format!("\"{i:06}\": {i}")).collect();
    project.add_file("map.json", &format!("{{{}}}", mapping.join(", ")));
    project.add_file("meta.csv", "code,name,prefecture\n");

    let service = loaded_service(&project, KeywordGenerator::compass());
    let results = service.search(&Query::new("east")).unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(results[0].code, "000000");
}
