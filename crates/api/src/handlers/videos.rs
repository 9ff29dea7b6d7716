//! Handlers for the `/videos` resource.
//!
//! A video generation is a long-running backend operation. `POST` starts
//! it and hands the operation to the job registry, which polls it in the
//! background; `GET` reads the job's current status and `DELETE` stops
//! tracking it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use imgstudio_genmedia::requests::VideoGenerationRequest;
use uuid::Uuid;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::tracker::VideoJob;

/// POST /api/v1/videos
///
/// Validate the form, start the generation on the backend, and begin
/// tracking the returned operation. Returns 202 with the running job.
pub async fn create_video(
    State(state): State<AppState>,
    Json(input): Json<VideoGenerationRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let operation = state.backend.start_video_generation(&input).await?;
    let job = state.videos.track(operation, &input.prompt);

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}

/// GET /api/v1/videos
pub async fn list_videos(State(state): State<AppState>) -> Json<DataResponse<Vec<VideoJob>>> {
    Json(DataResponse {
        data: state.videos.list(),
    })
}

/// GET /api/v1/videos/{id}
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DataResponse<VideoJob>>> {
    let job = state.videos.get(id)?;
    Ok(Json(DataResponse { data: job }))
}

/// DELETE /api/v1/videos/{id}
///
/// Stop polling the job. Idempotent: cancelling a cancelled or finished job
/// returns it unchanged.
pub async fn cancel_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DataResponse<VideoJob>>> {
    let job = state.videos.cancel(id)?;
    Ok(Json(DataResponse { data: job }))
}
