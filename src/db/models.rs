use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    AttemptStatus, AudioStatus, ExamStatus, QuestionType, RubricStatus, StageStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) teacher_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) status: ExamStatus,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) points_total: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
}

/// AI enrichment state of a question: status, retry counter and last error per artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionAiState {
    pub(crate) audio_status: AudioStatus,
    pub(crate) rubric_status: RubricStatus,
    pub(crate) audio_retry_count: i32,
    pub(crate) rubric_retry_count: i32,
    pub(crate) audio_error: Option<String>,
    pub(crate) rubric_error: Option<String>,
}

impl QuestionAiState {
    pub(crate) fn initial(question_type: QuestionType) -> Self {
        let rubric_status =
            if question_type.is_mcq() { RubricStatus::Skipped } else { RubricStatus::Pending };

        Self {
            audio_status: AudioStatus::Pending,
            rubric_status,
            audio_retry_count: 0,
            rubric_retry_count: 0,
            audio_error: None,
            rubric_error: None,
        }
    }

    /// Readiness predicate. A skipped rubric satisfies the rubric requirement.
    pub(crate) fn is_ready(&self, question_type: QuestionType, requires_audio: bool) -> bool {
        let audio_ok = !requires_audio || self.audio_status == AudioStatus::Done;
        let rubric_ok = question_type.is_mcq()
            || matches!(self.rubric_status, RubricStatus::Done | RubricStatus::Skipped);
        audio_ok && rubric_ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) teacher_id: String,
    pub(crate) order_index: i32,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) options: Json<Vec<String>>,
    pub(crate) correct_option_index: Option<i32>,
    pub(crate) marks: f64,
    pub(crate) expected_answer: Option<String>,
    pub(crate) requires_audio: bool,
    #[sqlx(flatten)]
    pub(crate) ai: QuestionAiState,
    pub(crate) tts_generated: bool,
    pub(crate) tts_audio_key: Option<String>,
    pub(crate) rubric: Option<Json<serde_json::Value>>,
    pub(crate) is_ready_for_publish: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) deadline_at: PrimitiveDateTime,
    pub(crate) finished_at: Option<PrimitiveDateTime>,
    pub(crate) total_score: Option<f64>,
    pub(crate) max_score: Option<f64>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Answer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_option_index: Option<i32>,
    pub(crate) audio_keys: Json<Vec<String>>,
    pub(crate) transcribed_text: Option<String>,
    pub(crate) stt_status: StageStatus,
    pub(crate) stt_error: Option<String>,
    pub(crate) stt_timestamp: Option<PrimitiveDateTime>,
    pub(crate) score: Option<f64>,
    pub(crate) max_marks: Option<f64>,
    pub(crate) evaluation_feedback: Option<String>,
    pub(crate) evaluation_model: Option<String>,
    pub(crate) evaluation_status: StageStatus,
    pub(crate) evaluated_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Answer {
    pub(crate) fn has_audio(&self) -> bool {
        !self.audio_keys.0.is_empty()
    }

    /// Text to grade: the transcript when one exists, otherwise the typed answer.
    pub(crate) fn source_text(&self) -> Option<&str> {
        self.transcribed_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .or(self.answer_text.as_deref())
            .filter(|text| !text.trim().is_empty())
    }
}
