//! Submission and query surface over the job store and artifact store.

use chrono::Utc;
use garde::Validate;
use std::sync::Arc;
use tokio::fs::File;
use uuid::Uuid;

use crate::models::generation::{DeleteResponse, JobListResponse};
use crate::models::job::{AvatarMode, GenerationRequest, Job, JobStatus, JobView};
use crate::services::artifacts::{ArtifactError, ArtifactStore};
use crate::services::supervisor::Supervisor;
use crate::store::SharedJobStore;

/// An uploaded reference image as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct JobRegistry {
    store: SharedJobStore,
    artifacts: Arc<ArtifactStore>,
    supervisor: Arc<Supervisor>,
}

impl JobRegistry {
    pub fn new(
        store: SharedJobStore,
        artifacts: Arc<ArtifactStore>,
        supervisor: Arc<Supervisor>,
    ) -> Self {
        Self {
            store,
            artifacts,
            supervisor,
        }
    }

    pub fn store(&self) -> &SharedJobStore {
        &self.store
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Validate a request, create its job and start rendering in the
    /// background. Returns as soon as the job is queued.
    ///
    /// Nothing is allocated when validation fails. Once an id exists, later
    /// problems (store down, image not writable) never fail the call: the
    /// client gets the id and learns the outcome from the job status.
    pub async fn submit(
        &self,
        mut request: GenerationRequest,
        image: Option<ImageUpload>,
    ) -> Result<Job, RegistryError> {
        let image = match (request.avatar_mode, image) {
            (AvatarMode::Image, Some(upload)) => {
                let format = image::guess_format(&upload.bytes)
                    .map_err(|_| RegistryError::UnsupportedImage)?;
                request.image_name = upload.file_name.clone();
                Some((upload, format))
            }
            (AvatarMode::Image, None) => {
                return Err(RegistryError::Validation(
                    "avatar_mode 'image' requires an uploaded reference image".to_string(),
                ));
            }
            (mode, upload) => {
                if upload.is_some() {
                    tracing::debug!(avatar_mode = %mode, "Ignoring reference image");
                }
                request.image_name = None;
                None
            }
        };
        request
            .validate()
            .map_err(|e| RegistryError::Validation(e.to_string()))?;

        let job = Job::queued(Uuid::new_v4(), request, Utc::now());
        metrics::counter!("render_jobs_submitted_total").increment(1);

        if let Err(e) = self.store.put(&job).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to persist queued job");
        }

        let scratch = match image {
            Some((upload, format)) => {
                match self
                    .artifacts
                    .save_reference_image(job.id, format, &upload.bytes)
                    .await
                {
                    Ok(scratch) => Some(scratch),
                    Err(e) => {
                        tracing::error!(
                            job_id = %job.id,
                            error = %e,
                            "Failed to store reference image"
                        );
                        let cause = format!("failed to store reference image: {e}");
                        return Ok(self.supervisor.fail_unstarted(job, cause).await);
                    }
                }
            }
            None => None,
        };

        tracing::info!(
            job_id = %job.id,
            language = %job.request.language,
            duration = job.request.duration,
            "Render job queued"
        );

        let supervisor = Arc::clone(&self.supervisor);
        let queued = job.clone();
        tokio::spawn(async move {
            supervisor.run(queued, scratch).await;
        });

        Ok(job)
    }

    /// Current state of a job.
    ///
    /// Falls back to the artifact directory when the store does not know the
    /// id or cannot be reached: an artifact on disk means the job completed.
    pub async fn get_status(&self, id: Uuid) -> Result<JobView, RegistryError> {
        match self.store.get(id).await {
            Ok(Some(job)) => return Ok(JobView::from(&job)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    job_id = %id,
                    error = %e,
                    "Job store unavailable, checking artifacts"
                );
            }
        }

        match self.artifacts.info(id).await? {
            Some(info) => Ok(JobView::recovered(id, info.modified)),
            None => Err(RegistryError::NotFound(id)),
        }
    }

    /// Jobs newest first. Rebuilt from artifacts on disk when the store fails.
    pub async fn list(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<JobListResponse, RegistryError> {
        let jobs = match self.store.list(limit, offset).await {
            Ok(jobs) => JobListResponse {
                jobs: jobs.iter().map(JobView::from).collect(),
                limit,
                offset,
                from_store: true,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Job store unavailable, listing artifacts");
                let artifacts = self.artifacts.list().await?;
                JobListResponse {
                    jobs: artifacts
                        .into_iter()
                        .skip(offset)
                        .take(limit)
                        .map(|a| JobView::recovered(a.id, a.modified))
                        .collect(),
                    limit,
                    offset,
                    from_store: false,
                }
            }
        };
        Ok(jobs)
    }

    /// Remove a job's record and artifact.
    ///
    /// Jobs still queued or processing cannot be deleted; their supervisor
    /// would write the artifact after the fact. Nothing is removed while the
    /// store cannot say whether the job is finished.
    pub async fn delete(&self, id: Uuid) -> Result<DeleteResponse, RegistryError> {
        match self.store.get(id).await {
            Ok(Some(job)) if !job.status.is_terminal() => {
                return Err(RegistryError::StillRunning(id, job.status));
            }
            Ok(_) => {}
            Err(e) => return Err(RegistryError::StoreUnavailable(e.to_string())),
        }

        let record_removed = match self.store.delete(id).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Failed to delete job record");
                false
            }
        };
        let artifact_removed = self.artifacts.delete(id).await?;

        if !record_removed && !artifact_removed {
            return Err(RegistryError::NotFound(id));
        }

        tracing::info!(job_id = %id, record_removed, artifact_removed, "Job deleted");
        Ok(DeleteResponse {
            job_id: id,
            record_removed,
            artifact_removed,
        })
    }

    /// Open a job's artifact for download, with its length.
    pub async fn open_artifact(&self, id: Uuid) -> Result<(File, u64), RegistryError> {
        self.artifacts
            .open_reader(id)
            .await?
            .ok_or(RegistryError::NotFound(id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Uploaded reference image is not a supported image format")]
    UnsupportedImage,

    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Job {0} is still {1}")]
    StillRunning(Uuid, JobStatus),

    #[error("Job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
