//! Axum route handlers for the Analysis API.

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use tracing::info;

use crate::analysis::models::{AnalysisRequest, AnalysisResponse};
use crate::deadline::Deadline;
use crate::errors::AppError;
use crate::state::AppState;

/// POST /analysis
///
/// Validates the questionnaire and runs it through the orchestrator under the
/// configured deadline. The body is decoded by hand so that decode failures
/// map to 400 rather than axum's default rejections.
pub async fn handle_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AnalysisResponse>, AppError> {
    require_json(&headers)?;

    let request: AnalysisRequest =
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidRequest(e.to_string()))?;
    validate_request(&request)?;

    let deadline = Deadline::after(state.config.analysis_timeout);
    info!(
        answers = request.answers.len(),
        timeout_secs = deadline.remaining().as_secs(),
        "Analysis requested"
    );

    let response = state.analyzer.analyze(&request, &deadline).await?;

    Ok(Json(response))
}

/// A missing header is rejected like any other non-JSON type.
fn require_json(headers: &HeaderMap) -> Result<(), AppError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if content_type.to_ascii_lowercase().contains("application/json") {
        Ok(())
    } else {
        Err(AppError::UnsupportedMediaType(
            "Content-Type must be application/json".to_string(),
        ))
    }
}

pub fn validate_request(request: &AnalysisRequest) -> Result<(), AppError> {
    let first = request.answers.first().ok_or_else(|| {
        AppError::Validation("answers must contain at least one element".to_string())
    })?;

    if first.question_text.trim().is_empty() {
        return Err(AppError::Validation(
            "question_text is required".to_string(),
        ));
    }

    Ok(())
}
