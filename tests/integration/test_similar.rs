use crate::common::{KeywordGenerator, S, TestProject, loaded_service};
use munisearch::config::SearchConfig;
use munisearch::service::loader;
use munisearch::{SearchError, SearchService};

#[test]
fn test_similar_excludes_source_row() {
    let project = TestProject::scenario();
    let service = loaded_service(&project, KeywordGenerator::compass());

    let results = service.similar("A", None).unwrap();
    let codes: Vec<&str> = results.iter().map(|r| r.code.as_str()).collect();

    assert_eq!(codes, vec!["C", "B"]);
    assert!((results[0].score - S).abs() < 1e-5);
    assert!(results[1].score.abs() < 1e-6);
    assert_eq!(results[1].name, "Beta City");
}

#[test]
fn test_similar_unknown_code() {
    let project = TestProject::scenario();
    let service = loaded_service(&project, KeywordGenerator::compass());

    let err = service.similar("999999", Some(3)).unwrap_err();
    assert!(matches!(err, SearchError::CodeNotFound { ref code } if code == "999999"));
    assert_eq!(err.http_status(), 404);
}

#[test]
fn test_similar_respects_max_top_k() {
    let project = TestProject::scenario();
    let limits = SearchConfig {
        default_top_k: 5,
        max_top_k: Some(1),
    };
    let service = SearchService::new(limits);
    loader::initialize_with(&service, &project.settings(), KeywordGenerator::compass());

    let results = service.similar("C", Some(10)).unwrap();
    assert_eq!(results.len(), 1);
    assert_ne!(results[0].code, "C");
}

#[test]
fn test_similar_zero_top_k_is_empty() {
    let project = TestProject::scenario();
    let service = loaded_service(&project, KeywordGenerator::compass());

    assert!(service.similar("B", Some(0)).unwrap().is_empty());
}
