//! Backend response types and their normalization into display objects.
//!
//! The raw types mirror the backend's camelCase JSON. [`normalize_operation`]
//! and [`normalize_predictions`] turn them into [`GeneratedVideo`] and
//! [`GeneratedImage`] values the frontend can render directly.

use imgstudio_core::polling::OperationStatus;
use serde::{Deserialize, Serialize};

/// Public host that serves objects from `gs://` buckets.
const STORAGE_PUBLIC_HOST: &str = "https://storage.googleapis.com";

// ---------------------------------------------------------------------------
// Raw responses
// ---------------------------------------------------------------------------

/// Body returned by `predictLongRunning`.
#[derive(Debug, Deserialize)]
pub struct LongRunningResponse {
    /// Operation name used for every later status check.
    pub name: String,
}

/// Body returned by `fetchPredictOperation`.
#[derive(Debug, Deserialize)]
pub struct OperationResponse {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub response: Option<VideoResponse>,
}

#[derive(Debug, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    #[serde(default)]
    pub videos: Vec<MediaSample>,
    #[serde(default)]
    pub rai_media_filtered_count: Option<u32>,
    #[serde(default)]
    pub rai_media_filtered_reasons: Vec<String>,
}

/// One generated asset, either stored in a bucket or returned inline.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSample {
    #[serde(default)]
    pub gcs_uri: Option<String>,
    #[serde(default)]
    pub bytes_base64_encoded: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Body returned by the synchronous image `predict` call.
#[derive(Debug, Default, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub predictions: Vec<ImagePrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePrediction {
    #[serde(default)]
    pub gcs_uri: Option<String>,
    #[serde(default)]
    pub bytes_base64_encoded: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Set instead of image data when a safety filter removed the sample.
    #[serde(default)]
    pub rai_filtered_reason: Option<String>,
    /// Rewritten prompt, when prompt enhancement ran.
    #[serde(default)]
    pub prompt: Option<String>,
}

// ---------------------------------------------------------------------------
// Display objects
// ---------------------------------------------------------------------------

/// Where a generated asset's bytes live.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    GcsUri { uri: String },
    Inline { data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedVideo {
    pub source: MediaSource,
    pub mime_type: String,
    /// URL a browser can load directly.
    pub display_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedImage {
    pub source: MediaSource,
    pub mime_type: String,
    pub display_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced_prompt: Option<String>,
}

/// Map `gs://bucket/object` to its public HTTPS URL.
///
/// Returns `None` for anything that is not a bucket URI.
pub fn gcs_display_url(uri: &str) -> Option<String> {
    let path = uri.strip_prefix("gs://")?;
    if path.is_empty() {
        return None;
    }
    Some(format!("{STORAGE_PUBLIC_HOST}/{path}"))
}

fn to_source(
    gcs_uri: Option<String>,
    inline: Option<String>,
    mime_type: &str,
) -> Option<(MediaSource, String)> {
    if let Some(uri) = gcs_uri.filter(|u| !u.is_empty()) {
        let display_url = gcs_display_url(&uri).unwrap_or_else(|| uri.clone());
        return Some((MediaSource::GcsUri { uri }, display_url));
    }
    inline.filter(|d| !d.is_empty()).map(|data| {
        let display_url = format!("data:{mime_type};base64,{data}");
        (MediaSource::Inline { data }, display_url)
    })
}

/// Convert an operation report into the poller's status shape.
///
/// A finished operation with no videos but a non-zero safety-filter count
/// is reported as an error naming the filter reasons, so the user sees why
/// nothing came back.
pub fn normalize_operation(raw: OperationResponse) -> OperationStatus<Vec<GeneratedVideo>> {
    if !raw.done {
        return OperationStatus::pending();
    }

    if let Some(error) = raw.error {
        let message = error.message.filter(|m| !m.is_empty()).unwrap_or_else(|| {
            format!(
                "Operation failed with code {}",
                error.code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
            )
        });
        return OperationStatus::failed(message);
    }

    let response = raw.response.unwrap_or_default();
    let videos: Vec<GeneratedVideo> = response
        .videos
        .into_iter()
        .filter_map(|sample| {
            let mime_type = sample.mime_type.unwrap_or_else(|| "video/mp4".to_string());
            to_source(sample.gcs_uri, sample.bytes_base64_encoded, &mime_type).map(
                |(source, display_url)| GeneratedVideo {
                    source,
                    mime_type,
                    display_url,
                },
            )
        })
        .collect();

    let filtered = response.rai_media_filtered_count.unwrap_or(0);
    if videos.is_empty() && filtered > 0 {
        let reasons = if response.rai_media_filtered_reasons.is_empty() {
            "no reason given".to_string()
        } else {
            response.rai_media_filtered_reasons.join("; ")
        };
        return OperationStatus::failed(format!(
            "{filtered} video(s) blocked by safety filters: {reasons}"
        ));
    }

    OperationStatus::completed(videos)
}

/// Convert image predictions into display objects.
///
/// Samples removed by safety filters are dropped; when every sample was
/// removed the filter reasons are returned as the error.
pub fn normalize_predictions(raw: PredictResponse) -> Result<Vec<GeneratedImage>, String> {
    let mut images = Vec::new();
    let mut filtered = Vec::new();

    for prediction in raw.predictions {
        let mime_type = prediction
            .mime_type
            .unwrap_or_else(|| "image/png".to_string());
        match to_source(
            prediction.gcs_uri,
            prediction.bytes_base64_encoded,
            &mime_type,
        ) {
            Some((source, display_url)) => images.push(GeneratedImage {
                source,
                mime_type,
                display_url,
                enhanced_prompt: prediction.prompt,
            }),
            None => {
                if let Some(reason) = prediction.rai_filtered_reason {
                    filtered.push(reason);
                }
            }
        }
    }

    if images.is_empty() && !filtered.is_empty() {
        return Err(format!(
            "All images were blocked by safety filters: {}",
            filtered.join("; ")
        ));
    }
    Ok(images)
}
