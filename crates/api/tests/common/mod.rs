#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use imgstudio_api::config::ServerConfig;
use imgstudio_api::router::build_app_router;
use imgstudio_api::state::AppState;
use imgstudio_api::tracker::VideoJobRegistry;
use imgstudio_core::polling::{OperationStatus, PollConfig};
use imgstudio_core::types::OperationHandle;
use imgstudio_genmedia::messages::{GeneratedImage, GeneratedVideo, MediaSource};
use imgstudio_genmedia::requests::{ImageGenerationRequest, VideoGenerationRequest};
use imgstudio_genmedia::{BackendStatusCheck, GenMediaError, MediaBackend};

pub const OPERATION_NAME: &str =
    "projects/test/locations/us-central1/publishers/google/models/veo-2.0-generate-001/operations/op-1";

/// Finished jobs are dropped after this long in the test app.
pub const JOB_RETENTION_SECS: u64 = 60;

/// Poll schedule used by every test app: checks at 100, 300 and 700 ms,
/// timeout reported at 1500 ms.
pub fn test_poll_config() -> PollConfig {
    PollConfig::default()
        .with_initial_interval(Duration::from_millis(100))
        .with_max_interval(Duration::from_millis(1_000))
        .with_backoff_factor(2.0)
        .with_max_attempts(3)
        .with_jitter_factor(0.0)
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        job_retention_secs: JOB_RETENTION_SECS,
        poll: test_poll_config(),
    }
}

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

/// One scripted answer to a status fetch.
#[derive(Debug, Clone)]
pub enum Fetch {
    Pending,
    Done(Vec<GeneratedVideo>),
    Failed(String),
    Unreachable,
}

/// What image generation answers with.
#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Images(Vec<GeneratedImage>),
    Filtered(String),
    RateLimited,
}

/// In-memory [`MediaBackend`] driven by a script.
///
/// Status fetches pop from `fetches`; once the script runs out every fetch
/// reports the operation as still pending.
pub struct FakeBackend {
    pub reject_video_start: bool,
    pub fetches: Mutex<VecDeque<Fetch>>,
    pub fetch_count: Mutex<u32>,
    pub images: ImageOutcome,
}

impl FakeBackend {
    pub fn new(fetches: Vec<Fetch>) -> Self {
        Self {
            reject_video_start: false,
            fetches: Mutex::new(fetches.into()),
            fetch_count: Mutex::new(0),
            images: ImageOutcome::Images(vec![image("gs://out/img-0.png")]),
        }
    }

    pub fn fetch_count(&self) -> u32 {
        *self.fetch_count.lock().unwrap()
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn start_video_generation(
        &self,
        _request: &VideoGenerationRequest,
    ) -> Result<OperationHandle, GenMediaError> {
        if self.reject_video_start {
            return Err(GenMediaError::Api {
                status: 429,
                body: "quota exhausted".to_string(),
            });
        }
        Ok(OperationHandle::new(OPERATION_NAME))
    }

    async fn fetch_operation(
        &self,
        _handle: &OperationHandle,
    ) -> Result<OperationStatus<Vec<GeneratedVideo>>, GenMediaError> {
        *self.fetch_count.lock().unwrap() += 1;
        let next = self.fetches.lock().unwrap().pop_front().unwrap_or(Fetch::Pending);
        match next {
            Fetch::Pending => Ok(OperationStatus::pending()),
            Fetch::Done(videos) => Ok(OperationStatus::completed(videos)),
            Fetch::Failed(message) => Ok(OperationStatus::failed(message)),
            Fetch::Unreachable => Err(GenMediaError::Api {
                status: 503,
                body: "backend unavailable".to_string(),
            }),
        }
    }

    async fn generate_images(
        &self,
        _request: &ImageGenerationRequest,
    ) -> Result<Vec<GeneratedImage>, GenMediaError> {
        match &self.images {
            ImageOutcome::Images(images) => Ok(images.clone()),
            ImageOutcome::Filtered(reason) => Err(GenMediaError::Filtered(reason.clone())),
            ImageOutcome::RateLimited => Err(GenMediaError::Api {
                status: 429,
                body: "slow down".to_string(),
            }),
        }
    }
}

pub fn video(uri: &str) -> GeneratedVideo {
    GeneratedVideo {
        source: MediaSource::GcsUri {
            uri: uri.to_string(),
        },
        mime_type: "video/mp4".to_string(),
        display_url: uri.replacen("gs://", "https://storage.googleapis.com/", 1),
    }
}

pub fn image(uri: &str) -> GeneratedImage {
    GeneratedImage {
        source: MediaSource::GcsUri {
            uri: uri.to_string(),
        },
        mime_type: "image/png".to_string(),
        display_url: uri.replacen("gs://", "https://storage.googleapis.com/", 1),
        enhanced_prompt: None,
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build the full application router around `backend`.
///
/// Uses the same builder as `main.rs` so integration tests exercise the
/// production middleware stack.
pub fn build_test_app(backend: Arc<FakeBackend>) -> (Router, Arc<VideoJobRegistry>) {
    let config = test_config();
    let backend: Arc<dyn MediaBackend> = backend;
    let videos = Arc::new(VideoJobRegistry::new(
        Arc::new(BackendStatusCheck::new(Arc::clone(&backend))),
        config.poll.clone(),
        Duration::from_secs(config.job_retention_secs),
    ));

    let state = AppState {
        backend,
        videos: Arc::clone(&videos),
    };

    (build_app_router(state, &config), videos)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(body.to_string())).await
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
