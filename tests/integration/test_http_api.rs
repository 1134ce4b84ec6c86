//! The HTTP router over a service loaded from snapshot files.

use crate::common::{BrokenGenerator, KeywordGenerator, TestProject, loaded_service};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use munisearch::SearchService;
use munisearch::config::SearchConfig;
use munisearch::http::{AppState, router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn state(service: SearchService) -> AppState {
    AppState::new(Arc::new(service), Duration::from_secs(5))
}

async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_search(body: Value) -> Request<Body> {
    Request::post("/search")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_search_endpoint() {
    let project = TestProject::scenario();
    let app = state(loaded_service(&project, KeywordGenerator::compass()));

    let (status, body) = send(app, post_search(json!({"query": "east", "top_k": 2}))).await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["code"], "A");
    assert_eq!(results[0]["name"], "Alpha Town");
    assert_eq!(results[0]["prefecture"], "Hokkaido");
    assert_eq!(results[1]["code"], "C");
    assert_eq!(results[1]["name"], "");
}

#[tokio::test]
async fn test_search_min_score_filters() {
    let project = TestProject::scenario();
    let app = state(loaded_service(&project, KeywordGenerator::compass()));

    let (status, body) = send(
        app,
        post_search(json!({"query": "east", "top_k": 3, "min_score": 0.9})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_loading_service_returns_503_and_health_reports_loading() {
    let app = state(SearchService::new(SearchConfig::default()));

    let (status, body) = send(app.clone(), post_search(json!({"query": "east"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "NOT_READY");
    assert!(body["detail"].as_str().unwrap().contains("loading"));

    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "loading");
    assert_eq!(body["state"], "loading");
}

#[tokio::test]
async fn test_degraded_health_carries_reason() {
    let project = TestProject::new();
    let app = state(loaded_service(&project, KeywordGenerator::compass()));

    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "loading");
    assert_eq!(body["state"], "degraded");
    assert!(body["reason"].as_str().unwrap().contains("emb.npy"));
}

#[tokio::test]
async fn test_ready_health_includes_index_stats() {
    let project = TestProject::scenario();
    let app = state(loaded_service(&project, KeywordGenerator::compass()));

    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["index"]["rows"], 3);
    assert_eq!(body["index"]["dimension"], 2);
}

#[tokio::test]
async fn test_encoder_failure_mid_request_is_500() {
    let project = TestProject::scenario();
    let app = state(loaded_service(&project, Arc::new(BrokenGenerator)));

    let (status, body) = send(app, post_search(json!({"query": "east"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "SEARCH_FAILED");
    assert!(body["detail"].as_str().unwrap().contains("inference session closed"));
}

#[tokio::test]
async fn test_similar_endpoint() {
    let project = TestProject::scenario();
    let app = state(loaded_service(&project, KeywordGenerator::compass()));

    let (status, body) = send(app.clone(), get("/similar/A?top_k=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["code"], "C");

    let (status, body) = send(app.clone(), get("/similar/ZZZ")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CODE_NOT_FOUND");

    let (status, _) = send(app, get("/similar/A?top_k=-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
