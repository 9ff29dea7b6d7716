pub mod health;
pub mod images;
pub mod videos;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /videos                  start generation (POST), list jobs (GET)
/// /videos/{id}             job status (GET), cancel tracking (DELETE)
///
/// /images                  synchronous image generation (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/videos", videos::router())
        .nest("/images", images::router())
}
