//! Route definitions for synchronous image generation.
//!
//! Mounted at `/images`.

use axum::routing::post;
use axum::Router;

use crate::handlers::images;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(images::generate_images))
}
