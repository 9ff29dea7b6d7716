//! Generation form state and the wire payloads built from it.
//!
//! The form types deserialize from the public API's snake_case JSON. The
//! payload types serialize to the backend's `{ instances, parameters }`
//! camelCase shape, omitting every option the user left unset.

use imgstudio_core::error::CoreError;
use imgstudio_core::generation::{
    self, DEFAULT_IMAGE_ASPECT_RATIO, DEFAULT_PERSON_GENERATION, DEFAULT_VIDEO_ASPECT_RATIO,
    DEFAULT_VIDEO_DURATION_SECS, IMAGE_ASPECT_RATIOS, PERSON_GENERATION_POLICIES,
    REFERENCE_IMAGE_MIME_TYPES, VIDEO_ASPECT_RATIOS,
};
use serde::{Deserialize, Serialize};

fn default_video_aspect_ratio() -> String {
    DEFAULT_VIDEO_ASPECT_RATIO.to_string()
}

fn default_image_aspect_ratio() -> String {
    DEFAULT_IMAGE_ASPECT_RATIO.to_string()
}

fn default_duration_secs() -> u32 {
    DEFAULT_VIDEO_DURATION_SECS
}

fn default_sample_count() -> u32 {
    1
}

fn default_person_generation() -> String {
    DEFAULT_PERSON_GENERATION.to_string()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Form state
// ---------------------------------------------------------------------------

/// Inline image used as the first frame of an image-to-video generation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ReferenceImage {
    /// Base64-encoded image bytes.
    pub bytes_base64_encoded: String,
    pub mime_type: String,
}

/// Parameters collected by the video generation form.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VideoGenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_video_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u32,
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,
    #[serde(default)]
    pub seed: Option<u32>,
    #[serde(default = "default_person_generation")]
    pub person_generation: String,
    /// Let the backend rewrite the prompt before generating.
    #[serde(default = "default_true")]
    pub enhance_prompt: bool,
    #[serde(default)]
    pub reference_image: Option<ReferenceImage>,
    /// `gs://` prefix for the output; falls back to the configured bucket.
    #[serde(default)]
    pub storage_uri: Option<String>,
}

impl VideoGenerationRequest {
    /// A request with defaults for everything except the prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            aspect_ratio: default_video_aspect_ratio(),
            duration_secs: default_duration_secs(),
            sample_count: default_sample_count(),
            seed: None,
            person_generation: default_person_generation(),
            enhance_prompt: true,
            reference_image: None,
            storage_uri: None,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        generation::validate_prompt(&self.prompt)?;
        generation::validate_one_of("aspect_ratio", &self.aspect_ratio, VIDEO_ASPECT_RATIOS)?;
        generation::validate_video_duration(self.duration_secs)?;
        generation::validate_sample_count(self.sample_count)?;
        generation::validate_one_of(
            "person_generation",
            &self.person_generation,
            PERSON_GENERATION_POLICIES,
        )?;
        if let Some(image) = &self.reference_image {
            generation::validate_one_of(
                "reference_image.mime_type",
                &image.mime_type,
                REFERENCE_IMAGE_MIME_TYPES,
            )?;
            if image.bytes_base64_encoded.is_empty() {
                return Err(CoreError::Validation(
                    "reference_image has no image data".to_string(),
                ));
            }
        }
        if let Some(uri) = &self.storage_uri {
            generation::validate_storage_uri(uri)?;
        }
        Ok(())
    }

    /// Build the `predictLongRunning` body.
    ///
    /// `default_storage_uri` is used when the form did not name an output
    /// location.
    pub fn to_payload(&self, default_storage_uri: Option<&str>) -> VideoPayload {
        VideoPayload {
            instances: vec![VideoInstance {
                prompt: self.prompt.trim().to_string(),
                image: self.reference_image.clone(),
            }],
            parameters: VideoParameters {
                aspect_ratio: self.aspect_ratio.clone(),
                duration_seconds: self.duration_secs,
                sample_count: self.sample_count,
                negative_prompt: non_blank(self.negative_prompt.as_deref()),
                seed: self.seed,
                person_generation: self.person_generation.clone(),
                enhance_prompt: self.enhance_prompt,
                storage_uri: self
                    .storage_uri
                    .clone()
                    .or_else(|| default_storage_uri.map(str::to_string)),
            },
        }
    }
}

/// Parameters collected by the image generation form.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_image_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,
    #[serde(default)]
    pub seed: Option<u32>,
    #[serde(default = "default_person_generation")]
    pub person_generation: String,
    /// Visual style, e.g. "watercolor".
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub lighting: Option<String>,
    #[serde(default)]
    pub composition: Option<String>,
    #[serde(default = "default_true")]
    pub add_watermark: bool,
}

impl ImageGenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            aspect_ratio: default_image_aspect_ratio(),
            sample_count: default_sample_count(),
            seed: None,
            person_generation: default_person_generation(),
            style: None,
            lighting: None,
            composition: None,
            add_watermark: true,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        generation::validate_prompt(&self.prompt)?;
        generation::validate_one_of("aspect_ratio", &self.aspect_ratio, IMAGE_ASPECT_RATIOS)?;
        generation::validate_sample_count(self.sample_count)?;
        generation::validate_one_of(
            "person_generation",
            &self.person_generation,
            PERSON_GENERATION_POLICIES,
        )?;
        // The backend ignores seeds on watermarked output.
        if self.seed.is_some() && self.add_watermark {
            return Err(CoreError::Validation(
                "seed requires add_watermark to be false".to_string(),
            ));
        }
        Ok(())
    }

    /// Prompt with the style, lighting and composition modifiers appended.
    pub fn full_prompt(&self) -> String {
        generation::compose_prompt(
            &self.prompt,
            &[
                self.style.as_deref(),
                self.lighting.as_deref(),
                self.composition.as_deref(),
            ],
        )
    }

    /// Build the `predict` body.
    pub fn to_payload(&self) -> ImagePayload {
        ImagePayload {
            instances: vec![ImageInstance {
                prompt: self.full_prompt(),
            }],
            parameters: ImageParameters {
                sample_count: self.sample_count,
                aspect_ratio: self.aspect_ratio.clone(),
                negative_prompt: non_blank(self.negative_prompt.as_deref()),
                seed: self.seed,
                person_generation: self.person_generation.clone(),
                add_watermark: self.add_watermark,
            },
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct VideoPayload {
    pub instances: Vec<VideoInstance>,
    pub parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInstance {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ReferenceImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoParameters {
    pub aspect_ratio: String,
    pub duration_seconds: u32,
    pub sample_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    pub person_generation: String,
    pub enhance_prompt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImagePayload {
    pub instances: Vec<ImageInstance>,
    pub parameters: ImageParameters,
}

#[derive(Debug, Serialize)]
pub struct ImageInstance {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageParameters {
    pub sample_count: u32,
    pub aspect_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    pub person_generation: String,
    pub add_watermark: bool,
}
