use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::app_state::AppState;

pub mod admin;
pub mod generate;
pub mod health;
pub mod jobs;
pub mod metrics;

/// All application routes except `/metrics`, which carries its own state.
pub fn router(state: AppState) -> Router {
    let max_upload = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/health", get(health::health_check))
        .route("/api/v1/generate", post(generate::submit_generation))
        .route("/api/v1/jobs", get(jobs::list_jobs))
        .route(
            "/api/v1/jobs/{id}",
            get(jobs::get_job_status).delete(jobs::delete_job),
        )
        .route("/api/v1/jobs/{id}/download", get(jobs::download_artifact))
        .route("/api/v1/workspace", get(admin::workspace_status))
        .route("/api/v1/workspace/cleanup", post(admin::cleanup_workspace))
        .route(
            "/api/v1/profile",
            get(admin::get_profile).put(admin::put_profile),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload))
}

/// GET /: service banner.
async fn index() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "generate": "POST /api/v1/generate",
            "status": "GET /api/v1/jobs/{id}",
            "list": "GET /api/v1/jobs",
            "download": "GET /api/v1/jobs/{id}/download",
            "delete": "DELETE /api/v1/jobs/{id}",
            "workspace": "GET /api/v1/workspace",
            "cleanup": "POST /api/v1/workspace/cleanup",
            "profile": "GET|PUT /api/v1/profile",
            "health": "GET /health",
            "metrics": "GET /metrics",
        }
    }))
}
