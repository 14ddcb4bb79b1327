use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::analysis::{AnalysisFailure, AnalysisResponse};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Analysis timed out: {0}")]
    Timeout(String),

    /// Orchestration failed. `fallback` carries the sentinel report when
    /// generation retries were exhausted.
    #[error("Analysis failed: {message}")]
    Analysis {
        message: String,
        fallback: Option<AnalysisResponse>,
    },
}

impl From<AnalysisFailure> for AppError {
    fn from(failure: AnalysisFailure) -> Self {
        if failure.is_deadline() {
            return AppError::Timeout(failure.error.to_string());
        }
        AppError::Analysis {
            message: failure.error.to_string(),
            fallback: failure.sentinel,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, fallback) = match self {
            AppError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                msg,
                None,
            ),
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg, None)
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None),
            AppError::Timeout(msg) => {
                tracing::warn!("Analysis timed out: {msg}");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "ANALYSIS_TIMEOUT",
                    "The analysis did not complete in time".to_string(),
                    None,
                )
            }
            AppError::Analysis { message, fallback } => {
                tracing::error!("Analysis error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ANALYSIS_FAILED",
                    "An AI processing error occurred".to_string(),
                    fallback,
                )
            }
        };

        let mut body = json!({
            "error": {
                "code": code,
                "message": message
            }
        });
        if let Some(fallback) = fallback {
            body["fallback"] = json!(fallback);
        }

        (status, Json(body)).into_response()
    }
}
