use thiserror::Error;

use crate::analysis::models::AnalysisResponse;
use crate::deadline::DeadlineExceeded;
use crate::llm_client::{LlmError, ResolveError};

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Missing credential or malformed base address. Never retried.
    #[error(transparent)]
    Configuration(ResolveError),

    #[error("failed to initialize model after {attempts} attempts: {source}")]
    InitializationExhausted {
        attempts: u32,
        #[source]
        source: ResolveError,
    },

    #[error("generation failed after {attempts} attempts: {source}")]
    GenerationFailed {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("parse failed after {attempts} attempts: {source}")]
    ParseFailed {
        attempts: u32,
        #[source]
        source: serde_json::Error,
    },

    #[error("analysis deadline exceeded")]
    DeadlineExceeded,
}

impl From<DeadlineExceeded> for AnalysisError {
    fn from(_: DeadlineExceeded) -> Self {
        AnalysisError::DeadlineExceeded
    }
}

/// Terminal orchestration failure. When generation retries are exhausted a
/// user-facing sentinel response travels alongside the diagnostic error.
#[derive(Debug)]
pub struct AnalysisFailure {
    pub error: AnalysisError,
    pub sentinel: Option<AnalysisResponse>,
}

impl AnalysisFailure {
    /// Pairs an exhausted Phase B error with its sentinel response.
    pub fn exhausted(error: AnalysisError) -> Self {
        let sentinel = match &error {
            AnalysisError::ParseFailed { .. } => AnalysisResponse::parsing_failed(),
            _ => AnalysisResponse::analysis_failed(),
        };
        Self {
            error,
            sentinel: Some(sentinel),
        }
    }

    pub fn is_deadline(&self) -> bool {
        matches!(self.error, AnalysisError::DeadlineExceeded)
    }
}

impl From<AnalysisError> for AnalysisFailure {
    fn from(error: AnalysisError) -> Self {
        Self {
            error,
            sentinel: None,
        }
    }
}

impl From<DeadlineExceeded> for AnalysisFailure {
    fn from(e: DeadlineExceeded) -> Self {
        AnalysisError::from(e).into()
    }
}
