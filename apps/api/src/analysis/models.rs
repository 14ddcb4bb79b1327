use serde::{Deserialize, Serialize};

/// Shown in place of a report when generation never succeeded.
pub const ANALYSIS_FAILED: &str = "An error occurred during analysis";
/// Shown in place of a report when the model never returned parseable output.
pub const PARSING_FAILED: &str = "An error occurred while parsing the AI response";

/// One answered question. `answered_at` is passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestionAnswer {
    pub question_text: String,
    pub answer: String,
    #[serde(rename = "time")]
    pub answered_at: String,
}

/// Inbound questionnaire. Order of `answers` is presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisRequest {
    pub answers: Vec<QuestionAnswer>,
}

/// Structured evaluation returned by the model and by `POST /analysis`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub detailed_report: String,
    pub resume: String,
}

impl AnalysisResponse {
    pub fn analysis_failed() -> Self {
        Self::sentinel(ANALYSIS_FAILED)
    }

    pub fn parsing_failed() -> Self {
        Self::sentinel(PARSING_FAILED)
    }

    fn sentinel(text: &str) -> Self {
        Self {
            detailed_report: text.to_string(),
            resume: text.to_string(),
        }
    }
}
