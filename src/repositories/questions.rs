use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Question;
use crate::repositories::{AiStateUpdate, NewQuestion, QuestionContent};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, teacher_id, order_index, text, question_type, options, correct_option_index, \
    marks, expected_answer, requires_audio, audio_status, rubric_status, audio_retry_count, \
    rubric_retry_count, audio_error, rubric_error, tts_generated, tts_audio_key, rubric, \
    is_ready_for_publish, created_at, updated_at";

pub(crate) async fn create(pool: &PgPool, question: NewQuestion) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, exam_id, teacher_id, order_index, text, question_type, options,
            correct_option_index, marks, expected_answer, requires_audio, audio_status,
            rubric_status, audio_retry_count, rubric_retry_count, audio_error, rubric_error,
            is_ready_for_publish, created_at, updated_at
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$19)
        RETURNING {COLUMNS}"
    ))
    .bind(question.id)
    .bind(question.exam_id)
    .bind(question.teacher_id)
    .bind(question.order_index)
    .bind(question.text)
    .bind(question.question_type)
    .bind(Json(question.options))
    .bind(question.correct_option_index)
    .bind(question.marks)
    .bind(question.expected_answer)
    .bind(question.requires_audio)
    .bind(question.ai.audio_status)
    .bind(question.ai.rubric_status)
    .bind(question.ai.audio_retry_count)
    .bind(question.ai.rubric_retry_count)
    .bind(question.ai.audio_error)
    .bind(question.ai.rubric_error)
    .bind(question.is_ready_for_publish)
    .bind(question.created_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY order_index, created_at"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn update_content(
    pool: &PgPool,
    content: &QuestionContent,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE questions SET text = $1, options = $2, order_index = $3, updated_at = $4
         WHERE id = $5",
    )
    .bind(&content.text)
    .bind(Json(&content.options))
    .bind(content.order_index)
    .bind(now)
    .bind(&content.question_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_ai_state(
    pool: &PgPool,
    id: &str,
    update: &AiStateUpdate,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE questions
         SET audio_status = $1,
             rubric_status = $2,
             audio_retry_count = $3,
             rubric_retry_count = $4,
             audio_error = $5,
             rubric_error = $6,
             tts_generated = $7,
             tts_audio_key = $8,
             rubric = $9,
             is_ready_for_publish = $10,
             updated_at = $11
         WHERE id = $12",
    )
    .bind(update.ai.audio_status)
    .bind(update.ai.rubric_status)
    .bind(update.ai.audio_retry_count)
    .bind(update.ai.rubric_retry_count)
    .bind(update.ai.audio_error.as_deref())
    .bind(update.ai.rubric_error.as_deref())
    .bind(update.tts_generated)
    .bind(update.tts_audio_key.as_deref())
    .bind(update.rubric.as_ref().map(Json))
    .bind(update.is_ready_for_publish)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
