use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::registry::RegistryError;
use crate::services::workspace::WorkspaceError;

/// JSON body of every API error.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Registry(err) => match err {
                RegistryError::Validation(msg) => {
                    tracing::warn!(message = %msg, "Rejected generation request");
                    (
                        StatusCode::BAD_REQUEST,
                        ErrorResponse::with_details("Invalid request", msg.clone()),
                    )
                }
                RegistryError::UnsupportedImage => (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    ErrorResponse::with_details("Unsupported image", err.to_string()),
                ),
                RegistryError::NotFound(id) => (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {id}")),
                ),
                RegistryError::StillRunning(id, status) => {
                    tracing::warn!(job_id = %id, status = %status, "Refused to delete active job");
                    (
                        StatusCode::CONFLICT,
                        ErrorResponse::with_details("Job is still active", err.to_string()),
                    )
                }
                RegistryError::StoreUnavailable(msg) => {
                    tracing::error!(error = %msg, "Job store unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ErrorResponse::with_details("Job store unavailable", msg.clone()),
                    )
                }
                RegistryError::Artifact(e) => {
                    tracing::error!(error = %e, "Artifact storage error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::with_details("Artifact storage error", e.to_string()),
                    )
                }
            },
            ApiError::Workspace(err) => match err {
                WorkspaceError::Validation(msg) => (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Invalid profile", msg.clone()),
                ),
                _ => {
                    tracing::error!(error = %err, "Workspace error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::with_details("Workspace error", err.to_string()),
                    )
                }
            },
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
