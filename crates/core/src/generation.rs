//! Generation form constants and validation.
//!
//! The allowed values mirror what the generative-media backend accepts for
//! video (long-running) and image (synchronous) generation. Wire payloads
//! are assembled in `imgstudio_genmedia::requests`; this module only decides
//! whether the form state is acceptable.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// Aspect ratios accepted for video generation.
pub const VIDEO_ASPECT_RATIOS: &[&str] = &["16:9", "9:16"];
/// Default video aspect ratio.
pub const DEFAULT_VIDEO_ASPECT_RATIO: &str = "16:9";

pub const MIN_VIDEO_DURATION_SECS: u32 = 5;
pub const MAX_VIDEO_DURATION_SECS: u32 = 8;
pub const DEFAULT_VIDEO_DURATION_SECS: u32 = 8;

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// Aspect ratios accepted for image generation.
pub const IMAGE_ASPECT_RATIOS: &[&str] = &["1:1", "3:4", "4:3", "9:16", "16:9"];
pub const DEFAULT_IMAGE_ASPECT_RATIO: &str = "1:1";

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

pub const MIN_SAMPLE_COUNT: u32 = 1;
pub const MAX_SAMPLE_COUNT: u32 = 4;

/// Longest prompt we forward, in characters.
pub const MAX_PROMPT_CHARS: usize = 4_000;

/// Person-generation policies understood by the backend.
pub const PERSON_GENERATION_POLICIES: &[&str] = &["dont_allow", "allow_adult", "allow_all"];
pub const DEFAULT_PERSON_GENERATION: &str = "allow_adult";

/// MIME types accepted for reference images.
pub const REFERENCE_IMAGE_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

/// Validate a prompt: non-blank and at most [`MAX_PROMPT_CHARS`] characters.
pub fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::Validation("Prompt must not be empty".to_string()));
    }
    let chars = prompt.chars().count();
    if chars > MAX_PROMPT_CHARS {
        return Err(CoreError::Validation(format!(
            "Prompt is {chars} characters; the limit is {MAX_PROMPT_CHARS}"
        )));
    }
    Ok(())
}

/// Validate that `value` is one of `allowed`, naming the field in the error.
pub fn validate_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), CoreError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid {field} '{value}'. Must be one of: {}",
            allowed.join(", ")
        )))
    }
}

pub fn validate_video_duration(secs: u32) -> Result<(), CoreError> {
    if (MIN_VIDEO_DURATION_SECS..=MAX_VIDEO_DURATION_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "duration_secs must be between {MIN_VIDEO_DURATION_SECS} and \
             {MAX_VIDEO_DURATION_SECS}, got {secs}"
        )))
    }
}

pub fn validate_sample_count(count: u32) -> Result<(), CoreError> {
    if (MIN_SAMPLE_COUNT..=MAX_SAMPLE_COUNT).contains(&count) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "sample_count must be between {MIN_SAMPLE_COUNT} and {MAX_SAMPLE_COUNT}, got {count}"
        )))
    }
}

/// Validate a `gs://bucket/path` storage URI.
pub fn validate_storage_uri(uri: &str) -> Result<(), CoreError> {
    match uri.strip_prefix("gs://") {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') => Ok(()),
        _ => Err(CoreError::Validation(format!(
            "Storage URI '{uri}' must look like gs://bucket/path"
        ))),
    }
}

/// Append optional style modifiers to a prompt, comma separated.
///
/// Blank modifiers are skipped so an unset form field never leaves a
/// dangling separator.
pub fn compose_prompt(prompt: &str, modifiers: &[Option<&str>]) -> String {
    let mut composed = prompt.trim().to_string();
    for modifier in modifiers.iter().flatten() {
        let modifier = modifier.trim();
        if !modifier.is_empty() {
            composed.push_str(", ");
            composed.push_str(modifier);
        }
    }
    composed
}
