use serde::Serialize;

use crate::core::time::format_optional;
use crate::db::models::Exam;
use crate::db::types::{QuestionType, StageStatus};
use crate::schemas::attempt::AttemptResponse;
use crate::schemas::exam::ExamResponse;
use crate::services::results::{AnswerResult, AttemptResult, ExamResults};

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResultResponse {
    pub(crate) question_id: String,
    pub(crate) question_text: Option<String>,
    pub(crate) question_type: Option<QuestionType>,
    pub(crate) order_index: Option<i32>,
    pub(crate) marks: Option<f64>,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_option_index: Option<i32>,
    pub(crate) transcribed_text: Option<String>,
    pub(crate) stt_status: StageStatus,
    pub(crate) score: Option<f64>,
    pub(crate) max_marks: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) evaluation_status: StageStatus,
    pub(crate) evaluated_at: Option<String>,
}

impl From<AnswerResult> for AnswerResultResponse {
    fn from(result: AnswerResult) -> Self {
        let AnswerResult { answer, question } = result;
        Self {
            question_id: answer.question_id,
            question_text: question.as_ref().map(|question| question.text.clone()),
            question_type: question.as_ref().map(|question| question.question_type),
            order_index: question.as_ref().map(|question| question.order_index),
            marks: question.as_ref().map(|question| question.marks),
            answer_text: answer.answer_text,
            selected_option_index: answer.selected_option_index,
            transcribed_text: answer.transcribed_text,
            stt_status: answer.stt_status,
            score: answer.score,
            max_marks: answer.max_marks,
            feedback: answer.evaluation_feedback,
            evaluation_status: answer.evaluation_status,
            evaluated_at: format_optional(answer.evaluated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResultResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) answers: Vec<AnswerResultResponse>,
}

impl From<AttemptResult> for AttemptResultResponse {
    fn from(result: AttemptResult) -> Self {
        Self {
            attempt: result.attempt.into(),
            answers: result.answers.into_iter().map(AnswerResultResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResultsResponse {
    pub(crate) exam: ExamResponse,
    pub(crate) attempts: Vec<AttemptResultResponse>,
}

impl From<ExamResults> for ExamResultsResponse {
    fn from(results: ExamResults) -> Self {
        Self {
            exam: results.exam.into(),
            attempts: results.attempts.into_iter().map(AttemptResultResponse::from).collect(),
        }
    }
}

/// A student's view of one evaluated attempt.
#[derive(Debug, Serialize)]
pub(crate) struct StudentResultsResponse {
    pub(crate) exam: ExamResponse,
    #[serde(flatten)]
    pub(crate) result: AttemptResultResponse,
}

impl From<(Exam, AttemptResult)> for StudentResultsResponse {
    fn from((exam, result): (Exam, AttemptResult)) -> Self {
        Self { exam: exam.into(), result: result.into() }
    }
}
