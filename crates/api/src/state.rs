use std::sync::Arc;

use imgstudio_genmedia::MediaBackend;

use crate::tracker::VideoJobRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Generative-media backend (real client in production, fakes in tests).
    pub backend: Arc<dyn MediaBackend>,
    /// Long-running video jobs and their pollers.
    pub videos: Arc<VideoJobRegistry>,
}
