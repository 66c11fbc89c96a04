use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::models::generation::{DeleteResponse, JobListResponse, ListParams};
use crate::models::job::JobView;

const DEFAULT_PAGE: usize = 50;
const MAX_PAGE: usize = 200;

/// GET /api/v1/jobs/{id}: current state of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobView>> {
    Ok(Json(state.registry.get_status(job_id).await?))
}

/// GET /api/v1/jobs: newest jobs first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<JobListResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let offset = params.offset.unwrap_or(0);
    Ok(Json(state.registry.list(limit, offset).await?))
}

/// DELETE /api/v1/jobs/{id}: remove a finished job and its artifact.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<DeleteResponse>> {
    Ok(Json(state.registry.delete(job_id).await?))
}

/// GET /api/v1/jobs/{id}/download: stream the rendered video.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Response> {
    let (file, len) = state.registry.open_artifact(job_id).await?;
    tracing::debug!(job_id = %job_id, bytes = len, "Streaming artifact");

    let headers = [
        (header::CONTENT_TYPE, "video/mp4".to_string()),
        (header::CONTENT_LENGTH, len.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"avatar_{job_id}.mp4\""),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
