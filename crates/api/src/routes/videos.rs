//! Route definitions for long-running video generation jobs.
//!
//! Mounted at `/videos`.
//!
//! ```text
//! POST   /          create_video
//! GET    /          list_videos
//! GET    /{id}      get_video
//! DELETE /{id}      cancel_video
//! ```

use axum::routing::get;
use axum::Router;

use crate::handlers::videos;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(videos::list_videos).post(videos::create_video))
        .route("/{id}", get(videos::get_video).delete(videos::cancel_video))
}
