use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobStatus, JobView};

/// Response after submitting a generation request.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// Rough completion estimate in seconds (about twice the clip length).
    pub estimated_seconds: u32,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Page of jobs, newest first.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobView>,
    pub limit: usize,
    pub offset: usize,
    /// `false` when the job store was unreachable and the listing was rebuilt
    /// from artifacts on disk.
    pub from_store: bool,
}

/// Outcome of `DELETE /api/v1/jobs/{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub job_id: Uuid,
    pub record_removed: bool,
    pub artifact_removed: bool,
}
