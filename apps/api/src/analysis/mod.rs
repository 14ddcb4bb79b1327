// Questionnaire analysis: prompt building, provider orchestration, HTTP handler.
// All LLM calls go through llm_client; nothing here speaks a wire format.

pub mod error;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod prompts;

pub use error::{AnalysisError, AnalysisFailure};
pub use models::{AnalysisRequest, AnalysisResponse};
pub use orchestrator::{Analyzer, Orchestrator};
