//! Housekeeping over the scratch area, the artifact root and the training
//! profile record. None of this touches a running job.

use chrono::Utc;
use garde::Validate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

use crate::models::workspace::{CleanupReport, ProfileUpdate, TrainingProfile, WorkspaceStatus};
use crate::services::artifacts::{artifact_id, ArtifactError, ArtifactStore};
use crate::store::SharedJobStore;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

pub struct Workspace {
    store: SharedJobStore,
    artifacts: Arc<ArtifactStore>,
    profile_path: PathBuf,
}

impl Workspace {
    pub fn new(
        store: SharedJobStore,
        artifacts: Arc<ArtifactStore>,
        profile_path: PathBuf,
    ) -> Self {
        Self {
            store,
            artifacts,
            profile_path,
        }
    }

    pub async fn status(&self) -> Result<WorkspaceStatus, WorkspaceError> {
        let mut reference_images = 0;
        let mut reference_image_bytes = 0;
        let mut entries = fs::read_dir(self.artifacts.scratch_root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() && is_image(&entry.path()) {
                reference_images += 1;
                reference_image_bytes += meta.len();
            }
        }

        let artifacts = self.artifacts.list().await?;
        Ok(WorkspaceStatus {
            reference_images,
            reference_image_bytes,
            artifacts: artifacts.len(),
            artifact_bytes: artifacts.iter().map(|a| a.size).sum(),
        })
    }

    /// Remove leftover scratch files and anything in the output root that is
    /// not a job artifact.
    ///
    /// Scratch files belonging to a queued or processing job are kept, as are
    /// all of them when the job store cannot be asked.
    pub async fn cleanup(&self) -> Result<CleanupReport, WorkspaceError> {
        let mut report = CleanupReport::default();

        let mut entries = fs::read_dir(self.artifacts.scratch_root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            if let Some(id) = scratch_owner(&path) {
                if self.job_is_live(id).await {
                    continue;
                }
            }
            remove(&path, meta.len(), &mut report).await?;
        }

        let mut entries = fs::read_dir(self.artifacts.output_root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let meta = entry.metadata().await?;
            if meta.is_file() && artifact_id(&path).is_none() {
                remove(&path, meta.len(), &mut report).await?;
            }
        }

        tracing::info!(
            removed_files = report.removed_files,
            freed_bytes = report.freed_bytes,
            "Workspace cleanup finished"
        );
        Ok(report)
    }

    async fn job_is_live(&self, id: Uuid) -> bool {
        match self.store.get(id).await {
            Ok(Some(job)) => !job.status.is_terminal(),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(
                    job_id = %id,
                    error = %e,
                    "Job store unavailable, keeping scratch file"
                );
                true
            }
        }
    }

    pub async fn profile(&self) -> Result<Option<TrainingProfile>, WorkspaceError> {
        match fs::read(&self.profile_path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store the profile record. The accuracy score is whatever the external
    /// evaluator reported.
    pub async fn record_profile(
        &self,
        update: ProfileUpdate,
    ) -> Result<TrainingProfile, WorkspaceError> {
        update
            .validate()
            .map_err(|e| WorkspaceError::Validation(e.to_string()))?;

        let profile = TrainingProfile {
            name: update.name,
            reference_images: update.reference_images,
            accuracy: update.accuracy,
            updated_at: Utc::now(),
        };

        if let Some(parent) = self.profile_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write then rename so readers never see a half-written record.
        let staging = self.profile_path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(&profile)?).await?;
        fs::rename(&staging, &self.profile_path).await?;

        tracing::info!(
            name = %profile.name,
            accuracy = ?profile.accuracy,
            "Training profile recorded"
        );
        Ok(profile)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Job id encoded in a scratch file name (`<uuid>_avatar.<ext>`).
fn scratch_owner(path: &Path) -> Option<Uuid> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_suffix("_avatar")?.parse().ok()
}

async fn remove(path: &Path, len: u64, report: &mut CleanupReport) -> Result<(), WorkspaceError> {
    match fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed workspace file");
            report.removed_files += 1;
            report.freed_bytes += len;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Invalid profile: {0}")]
    Validation(String),

    #[error("Workspace I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Profile record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
