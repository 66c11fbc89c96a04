use chrono::{DateTime, Utc};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// File extension of rendered artifacts.
pub const ARTIFACT_EXTENSION: &str = "mp4";

/// Filesystem area for render outputs and uploaded reference images.
///
/// Artifacts are addressed by job id only: `<output_root>/<id>.mp4`. Each
/// supervisor writes just its own path, so no locking is involved.
pub struct ArtifactStore {
    output_root: PathBuf,
    scratch_root: PathBuf,
}

/// A stored artifact as seen on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactInfo {
    pub id: Uuid,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl ArtifactStore {
    /// Open the store, creating both directories if needed.
    pub async fn open(
        output_root: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
    ) -> Result<Self, ArtifactError> {
        let output_root = output_root.into();
        let scratch_root = scratch_root.into();
        fs::create_dir_all(&output_root).await?;
        fs::create_dir_all(&scratch_root).await?;
        Ok(Self {
            output_root,
            scratch_root,
        })
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Deterministic destination of a job's artifact.
    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.output_root.join(format!("{id}.{ARTIFACT_EXTENSION}"))
    }

    pub async fn exists(&self, id: Uuid) -> bool {
        fs::try_exists(self.path_for(id)).await.unwrap_or(false)
    }

    /// Size and modification time of a job's artifact, if it is present.
    pub async fn info(&self, id: Uuid) -> Result<Option<ArtifactInfo>, ArtifactError> {
        match fs::metadata(self.path_for(id)).await {
            Ok(meta) if meta.is_file() => Ok(Some(ArtifactInfo {
                id,
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Open a job's artifact for streaming.
    pub async fn open_reader(&self, id: Uuid) -> Result<Option<(fs::File, u64)>, ArtifactError> {
        match fs::File::open(self.path_for(id)).await {
            Ok(file) => {
                let len = file.metadata().await?.len();
                Ok(Some((file, len)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a job's artifact. `Ok(false)` when there was none.
    pub async fn delete(&self, id: Uuid) -> Result<bool, ArtifactError> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All artifacts under the output root, most recently modified first.
    /// Files not named `<uuid>.mp4` are ignored.
    pub async fn list(&self) -> Result<Vec<ArtifactInfo>, ArtifactError> {
        let mut artifacts = Vec::new();
        let mut entries = fs::read_dir(&self.output_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(id) = artifact_id(&path) else {
                continue;
            };
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            artifacts.push(ArtifactInfo {
                id,
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        artifacts.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(artifacts)
    }

    /// Persist an uploaded reference image for job `id`.
    ///
    /// The returned guard deletes the copy when dropped.
    pub async fn save_reference_image(
        &self,
        id: Uuid,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<ScratchFile, ArtifactError> {
        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let path = self.scratch_root.join(format!("{id}_avatar.{extension}"));
        fs::write(&path, bytes).await?;
        tracing::debug!(job_id = %id, path = %path.display(), "Saved reference image");
        Ok(ScratchFile { path })
    }
}

/// Job id of an artifact path, if the file name is `<uuid>.mp4`.
pub fn artifact_id(path: &Path) -> Option<Uuid> {
    if path.extension()? != ARTIFACT_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Temporary input file owned by one job run. Removed on drop, whichever way
/// the run ends.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove scratch file"
                )
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}
