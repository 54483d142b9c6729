pub mod charts;
pub mod config;
pub mod export;
pub mod fetcher;
pub mod github;
pub mod metrics;
pub mod pipeline;
pub mod runner;
pub mod summary;
pub mod types;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use config::{AppConfig, RepoId};
use runner::{RunRequest, RunResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Shared application state accessible to all request handlers.
pub struct AppState {
    /// Application configuration loaded from environment variables.
    pub config: AppConfig,
    /// Held for the duration of a run. Runs share the output directories, so only one may be
    /// in flight at a time.
    run_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            run_lock: Mutex::new(()),
        }
    }
}

/// Body of a run request. The token is optional; without it only public data is reachable.
#[derive(Debug, Default, Deserialize)]
pub struct RunBody {
    #[serde(default)]
    pub token: Option<String>,
}

pub fn create_app(state: Arc<AppState>) -> Router {
    let dirs = state.config.output_dirs();
    let static_dir = std::path::Path::new(&state.config.static_dir);
    let serve_dir =
        ServeDir::new(static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/repos/{owner}/{repo}/analytics", post(run_repo_analytics))
        .nest_service("/plots", ServeDir::new(dirs.plots))
        .nest_service("/csv", ServeDir::new(dirs.csv))
        .fallback_service(serve_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "repo-analytics",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn run_repo_analytics(
    Path(repo_id): Path<RepoId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunBody>,
) -> Result<Json<RunResponse>, (StatusCode, String)> {
    if let Err(e) = repo_id.validate() {
        tracing::warn!(repo_id = %repo_id, error = %e, "Rejected analytics request");
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    let _guard = state.run_lock.lock().await;
    tracing::debug!(repo_id = %repo_id, "Starting analytics run");

    let request = RunRequest {
        repo_id,
        token: body.token,
    };
    Ok(Json(runner::run_analytics(&state.config, &request).await))
}
