//! Handlers for the `/images` resource.
//!
//! Image generation is synchronous: the backend returns the images in the
//! response, so there is nothing to poll.

use axum::extract::State;
use axum::Json;
use imgstudio_genmedia::messages::GeneratedImage;
use imgstudio_genmedia::requests::ImageGenerationRequest;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/images
pub async fn generate_images(
    State(state): State<AppState>,
    Json(input): Json<ImageGenerationRequest>,
) -> AppResult<Json<DataResponse<Vec<GeneratedImage>>>> {
    input.validate()?;

    let images = state.backend.generate_images(&input).await?;
    tracing::info!(
        count = images.len(),
        aspect_ratio = %input.aspect_ratio,
        "Image generation completed",
    );

    Ok(Json(DataResponse { data: images }))
}
