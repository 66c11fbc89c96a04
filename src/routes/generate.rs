use axum::extract::{Multipart, State};
use axum::Json;
use std::str::FromStr;

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::generation::GenerateResponse;
use crate::models::job::{AvatarMode, GenerationRequest, Resolution};
use crate::services::registry::ImageUpload;

const DEFAULT_LANGUAGE: &str = "English";
const DEFAULT_DURATION: u32 = 20;
const DEFAULT_IMAGE_STRENGTH: f32 = 1.0;

/// POST /api/v1/generate: submit a text-to-avatar render.
///
/// Multipart fields: `text` (required), `language`, `resolution`, `duration`,
/// `image_strength`, `avatar_mode` and an optional `image` file. Unknown
/// fields are ignored.
pub async fn submit_generation(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<GenerateResponse>> {
    let mut text: Option<String> = None;
    let mut language: Option<String> = None;
    let mut resolution: Option<Resolution> = None;
    let mut duration: Option<u32> = None;
    let mut image_strength: Option<f32> = None;
    let mut avatar_mode: Option<AvatarMode> = None;
    let mut image: Option<ImageUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().map(str::to_owned);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                // Browsers send an empty part when no file was chosen.
                if !bytes.is_empty() {
                    image = Some(ImageUpload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                match name.as_str() {
                    "text" => text = Some(value),
                    "language" => language = non_empty(value),
                    "resolution" => resolution = parse_optional("resolution", value)?,
                    "duration" => duration = parse_optional("duration", value)?,
                    "image_strength" => image_strength = parse_optional("image_strength", value)?,
                    "avatar_mode" => avatar_mode = parse_optional("avatar_mode", value)?,
                    other => tracing::debug!(field = %other, "Ignoring unknown form field"),
                }
            }
        }
    }

    let text = text.ok_or_else(|| ApiError::BadRequest("missing form field 'text'".to_string()))?;
    let avatar_mode = avatar_mode.unwrap_or(if image.is_some() {
        AvatarMode::Image
    } else {
        AvatarMode::Default
    });

    let request = GenerationRequest {
        text,
        language: language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        resolution: resolution.unwrap_or_default(),
        duration: duration.unwrap_or(DEFAULT_DURATION),
        image_strength: image_strength.unwrap_or(DEFAULT_IMAGE_STRENGTH),
        avatar_mode,
        image_name: None,
    };

    let job = state.registry.submit(request, image).await?;

    Ok(Json(GenerateResponse {
        job_id: job.id,
        status: job.status,
        message: format!(
            "Avatar generation started ({} s, {})",
            job.request.duration, job.request.language
        ),
        created_at: job.created_at,
        estimated_seconds: job.request.duration.saturating_mul(2),
    }))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a form value, treating a blank value as absent.
fn parse_optional<T: FromStr>(field: &str, value: String) -> Result<Option<T>, ApiError> {
    non_empty(value)
        .map(|v| {
            v.parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid value for '{field}': {v}")))
        })
        .transpose()
}
