//! Composition of the renderer command line from a job's request.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::models::job::{AvatarMode, GenerationRequest};

/// The renderer samples at 6 frames per second of requested duration.
pub const FRAMES_PER_SECOND: u32 = 6;

/// Upper bound on frames per render (30 s at 6 fps, plus the conditioning frame).
pub const MAX_FRAMES: u32 = 181;

/// Everything the renderer needs for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInvocation {
    pub prompt: String,
    /// Reference image and its conditioning strength.
    pub image: Option<(PathBuf, f32)>,
    pub width: u32,
    pub height: u32,
    pub num_frames: u32,
    pub seed: u64,
    pub output_path: PathBuf,
}

impl RenderInvocation {
    /// Build the invocation for `request`.
    ///
    /// `image` is only used in [`AvatarMode::Image`]; the other modes never pass
    /// a reference image to the renderer.
    pub fn compose(
        request: &GenerationRequest,
        image: Option<&Path>,
        output_path: PathBuf,
        seed: u64,
    ) -> Self {
        let image = match request.avatar_mode {
            AvatarMode::Image => image.map(|path| (path.to_path_buf(), request.image_strength)),
            AvatarMode::Describe | AvatarMode::Default => None,
        };
        let (width, height) = request.resolution.dimensions();

        Self {
            prompt: compose_prompt(request, image.is_some()),
            image,
            width,
            height,
            num_frames: frame_count(request.duration),
            seed,
            output_path,
        }
    }

    /// Per-job arguments, appended after the configured leading arguments.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--prompt".into(),
            self.prompt.clone().into(),
            "--output-path".into(),
            self.output_path.clone().into(),
            "--height".into(),
            self.height.to_string().into(),
            "--width".into(),
            self.width.to_string().into(),
            "--num-frames".into(),
            self.num_frames.to_string().into(),
            "--seed".into(),
            self.seed.to_string().into(),
        ];
        if let Some((path, strength)) = &self.image {
            // Condition on frame 0 with the given strength.
            args.extend([
                "--image".into(),
                path.clone().into(),
                "0".into(),
                strength.to_string().into(),
            ]);
        }
        args
    }
}

pub fn frame_count(duration_secs: u32) -> u32 {
    duration_secs.saturating_mul(FRAMES_PER_SECOND).min(MAX_FRAMES)
}

fn compose_prompt(request: &GenerationRequest, with_image: bool) -> String {
    let language = request.language.trim();
    let text = request.text.trim();
    match (request.avatar_mode, with_image) {
        (AvatarMode::Image, true) => format!(
            "A person speaking fluently in {language}. They say: '{text}' \
             Clear pronunciation, steady eye contact, natural gestures, \
             consistent facial features matching the reference image."
        ),
        (AvatarMode::Describe, _) => format!(
            "A unique, newly imagined presenter speaking fluently in {language}. \
             They say: '{text}' Expressive face, natural lighting, neutral studio background."
        ),
        _ => format!(
            "A professional presenter speaking fluently in {language}. They say: '{text}' \
             Clear articulation, warm smile, modern office background, natural lighting."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_request;
    use crate::models::job::Resolution;

    #[test]
    fn test_frame_count_is_capped() {
        assert_eq!(frame_count(1), 6);
        assert_eq!(frame_count(20), 120);
        assert_eq!(frame_count(30), 180);
        assert_eq!(frame_count(45), MAX_FRAMES);
    }

    #[test]
    fn test_default_mode_ignores_image() {
        let request = sample_request();
        let invocation = RenderInvocation::compose(
            &request,
            Some(Path::new("/tmp/face.png")),
            PathBuf::from("/out/job.mp4"),
            42,
        );
        assert!(invocation.image.is_none());
        assert!(!invocation.to_args().contains(&OsString::from("--image")));
        assert!(invocation.prompt.contains("English"));
        assert!(invocation.prompt.contains("Hello world"));
    }

    #[test]
    fn test_image_mode_passes_image_and_strength() {
        let request = GenerationRequest {
            avatar_mode: AvatarMode::Image,
            image_strength: 1.5,
            resolution: Resolution::Base768,
            duration: 10,
            ..sample_request()
        };
        let invocation = RenderInvocation::compose(
            &request,
            Some(Path::new("/tmp/face.png")),
            PathBuf::from("/out/job.mp4"),
            7,
        );
        let args: Vec<String> = invocation
            .to_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let image_at = args.iter().position(|a| a == "--image").unwrap();
        assert_eq!(&args[image_at + 1..image_at + 4], ["/tmp/face.png", "0", "1.5"]);
        let frames_at = args.iter().position(|a| a == "--num-frames").unwrap();
        assert_eq!(args[frames_at + 1], "60");
        let width_at = args.iter().position(|a| a == "--width").unwrap();
        assert_eq!(args[width_at + 1], "768");
        let out_at = args.iter().position(|a| a == "--output-path").unwrap();
        assert_eq!(args[out_at + 1], "/out/job.mp4");
    }

    #[test]
    fn test_composition_is_deterministic() {
        let request = sample_request();
        let a = RenderInvocation::compose(&request, None, PathBuf::from("/out/a.mp4"), 42);
        let b = RenderInvocation::compose(&request, None, PathBuf::from("/out/a.mp4"), 42);
        assert_eq!(a, b);
        assert_eq!(a.to_args(), b.to_args());
    }
}
