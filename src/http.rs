//! HTTP front end for the search service.
//!
//! Routes:
//! - `POST /search` `{ query, top_k?, min_score? }` → `{ results: [...] }`
//! - `GET /similar/{code}?top_k=N` → `{ results: [...] }`
//! - `GET /health` → `{ status: "ok" | "loading", state, reason? }`
//!
//! Errors are returned as `{ detail, code }` with the status from
//! [`SearchError::http_status`].

#[cfg(feature = "http-server")]
pub use server::{AppState, router, serve_http};

#[cfg(feature = "http-server")]
mod server {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde::{Deserialize, Serialize};
    use tower::ServiceBuilder;
    use tower_http::cors::CorsLayer;
    use tracing::{error, info, warn};

    use crate::config::Settings;
    use crate::error::{SearchError, SearchResult};
    use crate::service::{self, Readiness, ScoredResult, SearchService};

    /// Shared handler state.
    #[derive(Clone)]
    pub struct AppState {
        pub service: Arc<SearchService>,
        pub request_timeout: Duration,
    }

    impl AppState {
        pub fn new(service: Arc<SearchService>, request_timeout: Duration) -> Self {
            Self {
                service,
                request_timeout,
            }
        }
    }

    #[derive(Debug, Deserialize)]
    struct SearchRequest {
        query: String,
        #[serde(default)]
        top_k: Option<i64>,
        #[serde(default)]
        min_score: Option<f32>,
    }

    #[derive(Debug, Deserialize)]
    struct SimilarParams {
        #[serde(default)]
        top_k: Option<i64>,
    }

    #[derive(Debug, Serialize)]
    struct SearchResponse {
        results: Vec<ScoredResult>,
    }

    #[derive(Debug, Serialize)]
    struct ErrorBody {
        detail: String,
        code: String,
    }

    /// [`SearchError`] rendered as a JSON response.
    struct ApiError(SearchError);

    impl From<SearchError> for ApiError {
        fn from(err: SearchError) -> Self {
            Self(err)
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.0.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = ErrorBody {
                detail: self.0.to_string(),
                code: self.0.status_code(),
            };
            (status, Json(body)).into_response()
        }
    }

    fn top_k_param(top_k: Option<i64>) -> SearchResult<Option<usize>> {
        top_k
            .map(|k| {
                usize::try_from(k).map_err(|_| SearchError::InvalidQuery {
                    reason: format!("top_k must not be negative, got {k}"),
                })
            })
            .transpose()
    }

    /// Run a blocking service call off the async runtime, bounded by the
    /// request timeout.
    async fn run_blocking<F>(state: &AppState, call: F) -> SearchResult<Vec<ScoredResult>>
    where
        F: FnOnce(&SearchService) -> SearchResult<Vec<ScoredResult>> + Send + 'static,
    {
        let service = state.service.clone();
        let task = tokio::task::spawn_blocking(move || call(service.as_ref()));

        match tokio::time::timeout(state.request_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!("Search task failed: {join_error}");
                Err(SearchError::SearchFailed {
                    message: "search task terminated unexpectedly".to_string(),
                })
            }
            Err(_) => {
                warn!("Search exceeded {:?}", state.request_timeout);
                Err(SearchError::SearchFailed {
                    message: format!(
                        "search did not finish within {} ms",
                        state.request_timeout.as_millis()
                    ),
                })
            }
        }
    }

    async fn search(
        State(state): State<AppState>,
        Json(req): Json<SearchRequest>,
    ) -> Result<Json<SearchResponse>, ApiError> {
        let query = service::Query {
            text: req.query,
            top_k: top_k_param(req.top_k)?,
            min_score: req.min_score,
        };
        let results = run_blocking(&state, move |svc| svc.search(&query)).await?;
        Ok(Json(SearchResponse { results }))
    }

    async fn similar(
        State(state): State<AppState>,
        Path(code): Path<String>,
        Query(params): Query<SimilarParams>,
    ) -> Result<Json<SearchResponse>, ApiError> {
        let top_k = top_k_param(params.top_k)?;
        let results = run_blocking(&state, move |svc| svc.similar(&code, top_k)).await?;
        Ok(Json(SearchResponse { results }))
    }

    async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
        let readiness = state.service.readiness();
        let status = if readiness.is_ready() { "ok" } else { "loading" };

        let mut body = serde_json::json!({
            "status": status,
            "state": readiness.name(),
        });
        if let Readiness::Degraded { reason } = &readiness {
            body["reason"] = serde_json::Value::String(reason.clone());
        }
        if let Some(stats) = state.service.stats().and_then(|s| serde_json::to_value(s).ok()) {
            body["index"] = stats;
        }
        Json(body)
    }

    /// Build the router over `state`.
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/search", post(search))
            .route("/similar/{code}", get(similar))
            .route("/health", get(health))
            .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
            .with_state(state)
    }

    // Helper function for shutdown signal
    async fn shutdown_signal() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    }

    /// Report the outcome of the background load.
    ///
    /// A load task that panics never completes the readiness transition, so
    /// the service is marked degraded here instead of loading forever.
    async fn watch_load(
        load: tokio::task::JoinHandle<Readiness>,
        search_service: Arc<SearchService>,
    ) -> Readiness {
        match load.await {
            Ok(Readiness::Ready) => info!("Search index ready"),
            Ok(other) => error!(
                "Search index unavailable: {}",
                other.reason().unwrap_or("unknown")
            ),
            Err(join_error) => {
                error!("Index load task failed: {join_error}");
                search_service.mark_degraded(format!("index load aborted: {join_error}"));
            }
        }
        search_service.readiness()
    }

    /// Load the index in the background and serve until Ctrl+C.
    ///
    /// The listener accepts requests while the index loads; they are
    /// answered with 503 until it is ready.
    pub async fn serve_http(settings: Settings, bind: String) -> anyhow::Result<()> {
        let search_service = Arc::new(SearchService::new(settings.search.clone()));
        let state = AppState::new(
            search_service.clone(),
            Duration::from_millis(settings.server.request_timeout_ms),
        );

        let loader_settings = settings.clone();
        let loader_service = search_service.clone();
        let load = tokio::task::spawn_blocking(move || {
            service::loader::initialize(&loader_service, &loader_settings)
        });
        tokio::spawn(watch_load(load, search_service));

        let listener = tokio::net::TcpListener::bind(&bind).await?;
        info!("Search server listening on http://{bind}");
        eprintln!("Search server listening on http://{bind}");
        eprintln!("Health check: http://{bind}/health");
        eprintln!("Press Ctrl+C to stop the server");

        axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }

}

#[cfg(not(feature = "http-server"))]
pub async fn serve_http(_settings: crate::Settings, _bind: String) -> anyhow::Result<()> {
    eprintln!("HTTP server support is not compiled in.");
    eprintln!("Please rebuild with: cargo build --features http-server");
    std::process::exit(1);
}
