use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::{Exam, Question};
use crate::db::types::{AudioStatus, ExamStatus, QuestionType, RubricStatus};
use crate::schemas::deserialize_option_datetime;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default, alias = "startTime", deserialize_with = "deserialize_option_datetime")]
    pub(crate) start_time: Option<OffsetDateTime>,
    #[serde(default, alias = "endTime", deserialize_with = "deserialize_option_datetime")]
    pub(crate) end_time: Option<OffsetDateTime>,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default, alias = "pointsTotal")]
    #[validate(range(min = 0.0, message = "points_total must be non-negative"))]
    pub(crate) points_total: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[serde(default, alias = "orderIndex")]
    #[validate(range(min = 0, message = "order_index must be non-negative"))]
    pub(crate) order_index: i32,
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: String,
    #[serde(alias = "type")]
    pub(crate) question_type: QuestionType,
    #[serde(default)]
    pub(crate) options: Vec<String>,
    #[serde(default, alias = "correctOptionIndex")]
    pub(crate) correct_option_index: Option<i32>,
    #[validate(range(min = 0.0, message = "marks must be non-negative"))]
    pub(crate) marks: f64,
    #[serde(default, alias = "expectedAnswer")]
    pub(crate) expected_answer: Option<String>,
    #[serde(default, alias = "requiresAudio")]
    pub(crate) requires_audio: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct FinalizedQuestion {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) options: Vec<String>,
    #[serde(default, alias = "orderIndex")]
    #[validate(range(min = 0, message = "order_index must be non-negative"))]
    pub(crate) order_index: i32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct PublishRequest {
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Vec<FinalizedQuestion>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) teacher_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) status: ExamStatus,
    pub(crate) start_time: Option<String>,
    pub(crate) end_time: Option<String>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) points_total: f64,
    pub(crate) created_at: String,
    pub(crate) published_at: Option<String>,
}

impl From<Exam> for ExamResponse {
    fn from(exam: Exam) -> Self {
        Self {
            id: exam.id,
            teacher_id: exam.teacher_id,
            title: exam.title,
            description: exam.description,
            status: exam.status,
            start_time: format_optional(exam.start_time),
            end_time: format_optional(exam.end_time),
            duration_minutes: exam.duration_minutes,
            points_total: exam.points_total,
            created_at: format_primitive(exam.created_at),
            published_at: format_optional(exam.published_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionStatusResponse {
    pub(crate) id: String,
    pub(crate) order_index: i32,
    pub(crate) question_type: QuestionType,
    pub(crate) requires_audio: bool,
    pub(crate) audio_status: AudioStatus,
    pub(crate) rubric_status: RubricStatus,
    pub(crate) audio_retry_count: i32,
    pub(crate) rubric_retry_count: i32,
    pub(crate) audio_error: Option<String>,
    pub(crate) rubric_error: Option<String>,
    pub(crate) tts_generated: bool,
    pub(crate) is_ready_for_publish: bool,
}

impl From<Question> for QuestionStatusResponse {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            order_index: question.order_index,
            question_type: question.question_type,
            requires_audio: question.requires_audio,
            audio_status: question.ai.audio_status,
            rubric_status: question.ai.rubric_status,
            audio_retry_count: question.ai.audio_retry_count,
            rubric_retry_count: question.ai.rubric_retry_count,
            audio_error: question.ai.audio_error,
            rubric_error: question.ai.rubric_error,
            tts_generated: question.tts_generated,
            is_ready_for_publish: question.is_ready_for_publish,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionsStatusResponse {
    pub(crate) exam_id: String,
    pub(crate) total: usize,
    pub(crate) pending: usize,
    pub(crate) questions: Vec<QuestionStatusResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EnrichmentResponse {
    pub(crate) exam_id: String,
    pub(crate) jobs_enqueued: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishResponse {
    pub(crate) exam_id: String,
    pub(crate) status: ExamStatus,
    pub(crate) enrichment_jobs: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishRejectedResponse {
    pub(crate) status: u16,
    pub(crate) detail: String,
    pub(crate) pending_questions: usize,
}
