use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use imgstudio_core::error::CoreError;
use imgstudio_genmedia::GenMediaError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`GenMediaError`] for backend
/// failures. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `imgstudio_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The generative-media backend failed or refused the request.
    #[error(transparent)]
    GenMedia(#[from] GenMediaError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
            },

            // --- Backend errors ---
            AppError::GenMedia(err) => classify_genmedia_error(err),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a backend error into an HTTP status, error code, and message.
///
/// - Safety-filter rejections map to 422 with the filter reasons.
/// - Backend 429 maps to 429 so clients can back off.
/// - Every other backend or transport failure maps to 502.
fn classify_genmedia_error(err: &GenMediaError) -> (StatusCode, &'static str, String) {
    match err {
        GenMediaError::Filtered(msg) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "CONTENT_FILTERED",
            msg.clone(),
        ),
        GenMediaError::Api { status: 429, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "The generative-media backend is rate limiting requests".to_string(),
        ),
        other => {
            tracing::error!(error = %other, "Generative-media backend error");
            (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                "The generative-media backend request failed".to_string(),
            )
        }
    }
}
