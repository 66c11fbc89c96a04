use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::models::workspace::{CleanupReport, ProfileUpdate, TrainingProfile, WorkspaceStatus};

/// GET /api/v1/workspace
pub async fn workspace_status(State(state): State<AppState>) -> ApiResult<Json<WorkspaceStatus>> {
    Ok(Json(state.workspace.status().await?))
}

/// POST /api/v1/workspace/cleanup
pub async fn cleanup_workspace(State(state): State<AppState>) -> ApiResult<Json<CleanupReport>> {
    Ok(Json(state.workspace.cleanup().await?))
}

/// GET /api/v1/profile: `null` until a profile has been recorded.
pub async fn get_profile(
    State(state): State<AppState>,
) -> ApiResult<Json<Option<TrainingProfile>>> {
    Ok(Json(state.workspace.profile().await?))
}

/// PUT /api/v1/profile
pub async fn put_profile(
    State(state): State<AppState>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<TrainingProfile>> {
    Ok(Json(state.workspace.record_profile(update).await?))
}
