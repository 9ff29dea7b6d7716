//! REST client for the generative-media backend.
//!
//! Wraps the three model endpoints ImgStudio uses with [`reqwest`]:
//! `predictLongRunning` (start a video), `fetchPredictOperation` (status of
//! a video operation) and `predict` (synchronous image generation). Every
//! call carries the configured bearer token.

use std::time::Duration;

use imgstudio_core::polling::OperationStatus;
use imgstudio_core::types::OperationHandle;

use crate::config::GenMediaConfig;
use crate::messages::{
    normalize_operation, normalize_predictions, GeneratedImage, GeneratedVideo,
    LongRunningResponse, OperationResponse, PredictResponse,
};
use crate::requests::{ImageGenerationRequest, VideoGenerationRequest};

/// HTTP client for the generative-media backend.
pub struct GenMediaApi {
    client: reqwest::Client,
    config: GenMediaConfig,
}

/// Errors from the generative-media REST layer.
#[derive(Debug, thiserror::Error)]
pub enum GenMediaError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Generative-media API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Every generated sample was removed by safety filters.
    #[error("{0}")]
    Filtered(String),
}

impl GenMediaApi {
    /// Create a client with the configured transport timeout.
    pub fn new(config: GenMediaConfig) -> Result<Self, GenMediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: GenMediaConfig) -> Self {
        Self { client, config }
    }

    /// Start a video generation and return its operation handle.
    pub async fn start_video_generation(
        &self,
        request: &VideoGenerationRequest,
    ) -> Result<OperationHandle, GenMediaError> {
        let payload = request.to_payload(self.config.output_bucket.as_deref());
        let url = self.model_url(&self.config.model_path(&self.config.video_model), "predictLongRunning");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(&payload)
            .send()
            .await?;

        let body: LongRunningResponse = Self::parse_response(response).await?;
        if body.name.is_empty() {
            return Err(GenMediaError::Decode(
                "predictLongRunning returned an empty operation name".to_string(),
            ));
        }

        tracing::info!(operation = %body.name, model = %self.config.video_model, "Video generation started");
        Ok(OperationHandle::new(body.name))
    }

    /// Fetch the current state of a video operation.
    ///
    /// The status endpoint lives on the model that issued the operation, so
    /// the model path is taken from the handle when it has one.
    pub async fn fetch_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus<Vec<GeneratedVideo>>, GenMediaError> {
        let model_path = operation_model_path(handle.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.model_path(&self.config.video_model));
        let url = self.model_url(&model_path, "fetchPredictOperation");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(&serde_json::json!({ "operationName": handle.as_str() }))
            .send()
            .await?;

        let body: OperationResponse = Self::parse_response(response).await?;
        Ok(normalize_operation(body))
    }

    /// Generate images synchronously.
    pub async fn generate_images(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<Vec<GeneratedImage>, GenMediaError> {
        let url = self.model_url(&self.config.model_path(&self.config.image_model), "predict");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(&request.to_payload())
            .send()
            .await?;

        let body: PredictResponse = Self::parse_response(response).await?;
        let images = normalize_predictions(body).map_err(GenMediaError::Filtered)?;
        tracing::info!(count = images.len(), model = %self.config.image_model, "Images generated");
        Ok(images)
    }

    // ---- private helpers ----

    fn model_url(&self, model_path: &str, method: &str) -> String {
        format!("{}/v1/{}:{}", self.config.base_url, model_path, method)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`GenMediaError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GenMediaError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GenMediaError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GenMediaError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| GenMediaError::Decode(e.to_string()))
    }
}

/// Model resource path embedded in an operation name.
///
/// `projects/p/locations/l/publishers/google/models/m/operations/123`
/// yields `projects/p/locations/l/publishers/google/models/m`.
pub fn operation_model_path(operation_name: &str) -> Option<&str> {
    operation_name
        .split_once("/operations/")
        .map(|(model, _)| model)
        .filter(|model| model.contains("/models/"))
}
