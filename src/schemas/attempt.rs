use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;
use crate::services::storage::StoredObject;

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) deadline_at: String,
    pub(crate) finished_at: Option<String>,
    pub(crate) total_score: Option<f64>,
    pub(crate) max_score: Option<f64>,
}

impl From<Attempt> for AttemptResponse {
    fn from(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            exam_id: attempt.exam_id,
            student_id: attempt.student_id,
            status: attempt.status,
            started_at: format_primitive(attempt.started_at),
            deadline_at: format_primitive(attempt.deadline_at),
            finished_at: format_optional(attempt.finished_at),
            total_score: attempt.total_score,
            max_score: attempt.max_score,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerSubmission {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(default, alias = "answerText")]
    pub(crate) answer_text: Option<String>,
    #[serde(default, alias = "selectedOptionIndex")]
    #[validate(range(min = 0, message = "selected_option_index must be non-negative"))]
    pub(crate) selected_option_index: Option<i32>,
    #[serde(default, alias = "audioKeys")]
    pub(crate) audio_keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct SubmitRequest {
    #[serde(default)]
    #[validate(nested)]
    pub(crate) answers: Vec<AnswerSubmission>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AudioUploadResponse {
    pub(crate) key: String,
    pub(crate) size: i64,
    pub(crate) sha256: String,
}

impl From<StoredObject> for AudioUploadResponse {
    fn from(stored: StoredObject) -> Self {
        Self { key: stored.key, size: stored.size, sha256: stored.sha256 }
    }
}
