// Prompts for questionnaire analysis.

use std::fmt::Write;

use crate::analysis::models::QuestionAnswer;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

pub const ANALYSIS_SYSTEM: &str = "\
    You are an experienced educational psychologist reviewing a student's questionnaire. \
    Each question is listed with its ordinal, the question text, the student's answer \
    and the time the answer took. Consider both the content of each answer and how long \
    the student needed to give it.\n\n\
    Respond with a JSON object with exactly two string fields:\n\
    - \"detailed_report\": a question-by-question analysis of the answers, noting \
    strengths, gaps and anything unusual about answer timing.\n\
    - \"resume\": a short overall summary of the student (3-5 sentences).";

/// Full system instruction sent with every analysis call.
pub fn system_instruction() -> String {
    format!("{ANALYSIS_SYSTEM}\n\n{JSON_ONLY_SYSTEM}")
}

/// Renders answers as consecutive four-line blocks, numbered from 1.
pub fn build_prompt(answers: &[QuestionAnswer]) -> String {
    answers
        .iter()
        .enumerate()
        .fold(String::new(), |mut prompt, (index, qa)| {
            // Writing into a String cannot fail.
            let _ = write!(
                prompt,
                "Question {}.\nQuestion text: {}\nStudent answer: {}\nAnswer time: {}\n",
                index + 1,
                qa.question_text,
                qa.answer,
                qa.answered_at,
            );
            prompt
        })
}
