pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod exams;
mod postgres;
pub(crate) mod questions;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Answer, Attempt, Exam, Question, QuestionAiState};
use crate::db::types::{AttemptStatus, QuestionType, StageStatus};

pub(crate) use postgres::PgStore;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct NewExam {
    pub(crate) id: String,
    pub(crate) teacher_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) points_total: f64,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct NewQuestion {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) teacher_id: String,
    pub(crate) order_index: i32,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) options: Vec<String>,
    pub(crate) correct_option_index: Option<i32>,
    pub(crate) marks: f64,
    pub(crate) expected_answer: Option<String>,
    pub(crate) requires_audio: bool,
    pub(crate) ai: QuestionAiState,
    pub(crate) is_ready_for_publish: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

/// Final text/options/order written when an exam is published.
#[derive(Debug, Clone)]
pub(crate) struct QuestionContent {
    pub(crate) question_id: String,
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    pub(crate) order_index: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct AiStateUpdate {
    pub(crate) ai: QuestionAiState,
    pub(crate) tts_generated: bool,
    pub(crate) tts_audio_key: Option<String>,
    pub(crate) rubric: Option<Value>,
    pub(crate) is_ready_for_publish: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct NewAttempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) deadline_at: PrimitiveDateTime,
}

/// Raw answer content keyed by (attempt, question). `id` is only used when the row is new.
#[derive(Debug, Clone)]
pub(crate) struct AnswerInput {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_option_index: Option<i32>,
    pub(crate) audio_keys: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct TranscriptionUpdate {
    pub(crate) transcribed_text: Option<String>,
    pub(crate) stt_status: StageStatus,
    pub(crate) stt_error: Option<String>,
    pub(crate) stt_timestamp: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone)]
pub(crate) struct EvaluationUpdate {
    pub(crate) score: Option<f64>,
    pub(crate) max_marks: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) model: Option<String>,
    pub(crate) status: StageStatus,
    pub(crate) evaluated_at: Option<PrimitiveDateTime>,
}

/// Persistence seam used by the pipelines and lifecycle services.
#[async_trait]
pub(crate) trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn create_exam(&self, exam: NewExam) -> Result<Exam, StoreError>;
    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError>;
    async fn publish_exam(&self, exam_id: &str, now: PrimitiveDateTime) -> Result<bool, StoreError>;
    async fn archive_exam(&self, exam_id: &str, now: PrimitiveDateTime) -> Result<bool, StoreError>;

    async fn create_question(&self, question: NewQuestion) -> Result<Question, StoreError>;
    async fn find_question(&self, question_id: &str) -> Result<Option<Question>, StoreError>;
    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, StoreError>;
    async fn update_question_content(
        &self,
        content: &QuestionContent,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;
    async fn update_question_ai(
        &self,
        question_id: &str,
        update: &AiStateUpdate,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError>;

    /// Inserts unless (exam, student) already has an attempt; returns whether a row was created.
    async fn create_attempt(&self, attempt: NewAttempt) -> Result<bool, StoreError>;
    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError>;
    async fn find_attempt_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<Attempt>, StoreError>;
    /// Attempts of an exam in start order.
    async fn list_attempts(&self, exam_id: &str) -> Result<Vec<Attempt>, StoreError>;
    /// Moves the attempt forward; returns false when the current status does not precede `status`.
    async fn advance_attempt(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;
    async fn mark_attempt_submitted(
        &self,
        attempt_id: &str,
        finished_at: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;
    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        total_score: f64,
        max_score: f64,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;
    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<String>, StoreError>;

    async fn upsert_answer(
        &self,
        answer: AnswerInput,
        now: PrimitiveDateTime,
    ) -> Result<Answer, StoreError>;
    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError>;
    async fn record_transcription(
        &self,
        answer_id: &str,
        update: &TranscriptionUpdate,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError>;
    async fn record_evaluation(
        &self,
        answer_id: &str,
        update: &EvaluationUpdate,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError>;
}
