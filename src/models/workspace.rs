use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// File counts for the scratch area and the artifact root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceStatus {
    pub reference_images: usize,
    pub reference_image_bytes: u64,
    pub artifacts: usize,
    pub artifact_bytes: u64,
}

/// What a cleanup pass removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CleanupReport {
    pub removed_files: usize,
    pub freed_bytes: u64,
}

/// Record of the avatar profile the renderer was trained on.
///
/// `accuracy` comes from whatever external scorer evaluated the profile. It is
/// stored as given and never computed here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingProfile {
    pub name: String,
    pub reference_images: u32,
    pub accuracy: Option<f32>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `PUT /api/v1/profile`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[garde(length(min = 1, max = 100))]
    pub name: String,

    #[garde(range(max = 10_000))]
    pub reference_images: u32,

    #[garde(range(min = 0.0, max = 100.0))]
    pub accuracy: Option<f32>,
}
