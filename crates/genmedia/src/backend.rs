//! Backend seam used by the API layer and by the poller.
//!
//! [`MediaBackend`] is implemented by [`GenMediaApi`] in production and by
//! in-memory fakes in tests. [`BackendStatusCheck`] adapts any backend to
//! the poller's [`StatusCheck`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use imgstudio_core::polling::OperationStatus;
use imgstudio_core::types::OperationHandle;
use uuid::Uuid;

use crate::api::{GenMediaApi, GenMediaError};
use crate::messages::{GeneratedImage, GeneratedVideo};
use crate::poller::StatusCheck;
use crate::requests::{ImageGenerationRequest, VideoGenerationRequest};

#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn start_video_generation(
        &self,
        request: &VideoGenerationRequest,
    ) -> Result<OperationHandle, GenMediaError>;

    async fn fetch_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus<Vec<GeneratedVideo>>, GenMediaError>;

    async fn generate_images(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<Vec<GeneratedImage>, GenMediaError>;
}

#[async_trait]
impl MediaBackend for GenMediaApi {
    async fn start_video_generation(
        &self,
        request: &VideoGenerationRequest,
    ) -> Result<OperationHandle, GenMediaError> {
        GenMediaApi::start_video_generation(self, request).await
    }

    async fn fetch_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus<Vec<GeneratedVideo>>, GenMediaError> {
        GenMediaApi::fetch_operation(self, handle).await
    }

    async fn generate_images(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<Vec<GeneratedImage>, GenMediaError> {
        GenMediaApi::generate_images(self, request).await
    }
}

/// Per-check context: which platform job the operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckContext {
    pub job_id: Uuid,
}

/// Status check that asks a [`MediaBackend`] for a video operation's state.
pub struct BackendStatusCheck {
    backend: Arc<dyn MediaBackend>,
}

impl BackendStatusCheck {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl StatusCheck for BackendStatusCheck {
    type Context = CheckContext;
    type Payload = Vec<GeneratedVideo>;
    type Error = GenMediaError;

    async fn check(
        &self,
        handle: &OperationHandle,
        context: &CheckContext,
    ) -> Result<OperationStatus<Vec<GeneratedVideo>>, GenMediaError> {
        let status = self.backend.fetch_operation(handle).await?;
        tracing::debug!(
            job_id = %context.job_id,
            operation = %handle,
            done = status.done,
            "Fetched operation status",
        );
        Ok(status)
    }
}
