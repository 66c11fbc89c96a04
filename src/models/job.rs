use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle state of a render job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// `Completed` and `Failed` are final; nothing changes a job after either.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Base resolution class. The renderer upscales 2x on its own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display, Default)]
pub enum Resolution {
    #[default]
    #[serde(rename = "512")]
    #[strum(serialize = "512")]
    Base512,
    #[serde(rename = "768")]
    #[strum(serialize = "768")]
    Base768,
}

impl Resolution {
    /// Output (width, height) handed to the renderer.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::Base512 => (512, 512),
            Resolution::Base768 => (768, 768),
        }
    }
}

/// Where the avatar's appearance comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AvatarMode {
    /// Condition on the uploaded reference image.
    Image,
    /// Let the renderer invent a face from the prompt alone.
    Describe,
    /// Use the renderer's default (trained) profile.
    Default,
}

/// Parameters of a generation request, kept on the job for auditing.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct GenerationRequest {
    #[garde(length(min = 1, max = 2000), custom(not_blank))]
    pub text: String,

    #[garde(length(min = 1, max = 64), custom(not_blank))]
    pub language: String,

    #[garde(skip)]
    pub resolution: Resolution,

    /// Requested clip length in seconds.
    #[garde(range(min = 1, max = 30))]
    pub duration: u32,

    /// How strongly the reference image conditions the render.
    #[garde(range(min = 0.5, max = 2.0), custom(finite))]
    pub image_strength: f32,

    #[garde(skip)]
    pub avatar_mode: AvatarMode,

    /// Original filename of the uploaded reference image, if any.
    #[garde(length(min = 1, max = 255))]
    pub image_name: Option<String>,
}

fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}

// NaN compares false against both bounds, so `range` alone lets it through.
fn finite(value: &f32, _ctx: &()) -> garde::Result {
    if !value.is_finite() {
        return Err(garde::Error::new("must be a finite number"));
    }
    Ok(())
}

/// A render job as persisted in the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub request: GenerationRequest,
    pub artifact_url: Option<String>,
    pub error: Option<String>,
    /// Pid of the render child while it runs, for reaping orphans.
    pub worker_pid: Option<u32>,
}

/// Partial update applied to a job through [`Job::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<f32>,
    pub artifact_url: Option<String>,
    pub error: Option<String>,
    pub worker_pid: Option<u32>,
}

impl JobPatch {
    pub fn processing(progress: f32) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn worker_pid(pid: u32) -> Self {
        Self {
            worker_pid: Some(pid),
            ..Self::default()
        }
    }

    pub fn completed(artifact_url: String) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100.0),
            artifact_url: Some(artifact_url),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl Job {
    /// A freshly submitted job.
    pub fn queued(id: Uuid, request: GenerationRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0.0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            request,
            artifact_url: None,
            error: None,
            worker_pid: None,
        }
    }

    /// Merge a patch into the job.
    ///
    /// Every store backend funnels mutation through here, so the lifecycle
    /// rules hold no matter where the record lives:
    /// - a terminal job is never modified again,
    /// - progress never goes down and stays within 0..=100,
    /// - `artifact_url` is only set on completion and `error` only on failure.
    ///
    /// Returns `false` when the patch was ignored because the job is terminal.
    pub fn apply(&mut self, patch: JobPatch, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        if let Some(pid) = patch.worker_pid {
            self.worker_pid = Some(pid);
        }

        if let Some(progress) = patch.progress {
            let progress = progress.clamp(0.0, 100.0);
            if progress > self.progress {
                self.progress = progress;
            }
        }

        match patch.status {
            Some(JobStatus::Processing) => self.status = JobStatus::Processing,
            Some(JobStatus::Completed) => {
                self.status = JobStatus::Completed;
                self.progress = 100.0;
                self.artifact_url = patch.artifact_url.or_else(|| Some(artifact_url(self.id)));
                self.completed_at = Some(now);
                self.worker_pid = None;
            }
            Some(JobStatus::Failed) => {
                self.status = JobStatus::Failed;
                self.error = Some(
                    patch
                        .error
                        .filter(|e| !e.is_empty())
                        .unwrap_or_else(|| "unknown failure".to_string()),
                );
                self.completed_at = Some(now);
                self.worker_pid = None;
            }
            Some(JobStatus::Queued) | None => {}
        }

        self.updated_at = now;
        true
    }
}

/// Download path a client uses to fetch a job's artifact.
pub fn artifact_url(id: Uuid) -> String {
    format!("/api/v1/jobs/{id}/download")
}

/// Client-facing view of a job's state.
///
/// Built from a stored [`Job`], or synthesized from an artifact on disk when the
/// job store no longer knows the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: f32,
    pub artifact_url: Option<String>,
    pub error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            artifact_url: job.artifact_url.clone(),
            error: job.error.clone(),
            created_at: Some(job.created_at),
            updated_at: Some(job.updated_at),
            completed_at: job.completed_at,
        }
    }
}

impl JobView {
    /// A completed view recovered from an artifact file.
    pub fn recovered(id: Uuid, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            job_id: id,
            status: JobStatus::Completed,
            progress: 100.0,
            artifact_url: Some(artifact_url(id)),
            error: None,
            created_at: None,
            updated_at: modified,
            completed_at: modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_request;

    #[test]
    fn test_progress_never_decreases() {
        let now = Utc::now();
        let mut job = Job::queued(Uuid::new_v4(), sample_request(), now);

        job.apply(JobPatch::processing(60.0), now);
        job.apply(JobPatch::processing(40.0), now);
        assert_eq!(job.progress, 60.0);
        assert_eq!(job.status, JobStatus::Processing);

        job.apply(JobPatch::processing(250.0), now);
        assert_eq!(job.progress, 100.0);
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let now = Utc::now();
        let mut job = Job::queued(Uuid::new_v4(), sample_request(), now);
        job.apply(JobPatch::processing(10.0), now);
        assert!(job.apply(JobPatch::failed("renderer exited with code 2"), now));

        let snapshot = job.clone();
        assert!(!job.apply(JobPatch::completed(artifact_url(job.id)), now));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error, snapshot.error);
        assert_eq!(job.progress, snapshot.progress);
        assert!(job.artifact_url.is_none());
    }

    #[test]
    fn test_completion_pins_progress_and_clears_pid() {
        let now = Utc::now();
        let mut job = Job::queued(Uuid::new_v4(), sample_request(), now);
        job.apply(JobPatch::worker_pid(4242), now);
        assert_eq!(job.worker_pid, Some(4242));

        job.apply(JobPatch::completed(artifact_url(job.id)), now);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert_eq!(job.completed_at, Some(now));
        assert!(job.worker_pid.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_failure_always_carries_a_cause() {
        let now = Utc::now();
        let mut job = Job::queued(Uuid::new_v4(), sample_request(), now);
        job.apply(JobPatch::failed(""), now);
        assert_eq!(job.error.as_deref(), Some("unknown failure"));
        assert!(job.artifact_url.is_none());
    }

    #[test]
    fn test_request_validation() {
        assert!(sample_request().validate().is_ok());

        let zero_duration = GenerationRequest {
            duration: 0,
            ..sample_request()
        };
        assert!(zero_duration.validate().is_err());

        let blank_text = GenerationRequest {
            text: "   ".to_string(),
            ..sample_request()
        };
        assert!(blank_text.validate().is_err());

        let too_strong = GenerationRequest {
            image_strength: 2.5,
            ..sample_request()
        };
        assert!(too_strong.validate().is_err());

        for strength in [f32::NAN, f32::INFINITY] {
            let not_a_number = GenerationRequest {
                image_strength: strength,
                ..sample_request()
            };
            assert!(not_a_number.validate().is_err());
        }
    }

    #[test]
    fn test_mode_and_resolution_parse_from_form_values() {
        use std::str::FromStr;

        assert_eq!(Resolution::from_str("768").unwrap(), Resolution::Base768);
        assert_eq!(Resolution::Base768.dimensions(), (768, 768));
        assert_eq!(AvatarMode::from_str("describe").unwrap(), AvatarMode::Describe);
        assert!(AvatarMode::from_str("random").is_err());
        assert_eq!(JobStatus::Processing.to_string(), "processing");
    }
}
