use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Answer;
use crate::db::types::StageStatus;
use crate::repositories::{AnswerInput, EvaluationUpdate, TranscriptionUpdate};

pub(crate) const COLUMNS: &str = "\
    id, attempt_id, exam_id, student_id, question_id, answer_text, selected_option_index, \
    audio_keys, transcribed_text, stt_status, stt_error, stt_timestamp, score, max_marks, \
    evaluation_feedback, evaluation_model, evaluation_status, evaluated_at, created_at, updated_at";

/// Writes raw answer content. Stage fields of an existing row are left untouched, and an
/// empty audio list never clears previously uploaded recordings.
pub(crate) async fn upsert(
    pool: &PgPool,
    answer: AnswerInput,
    now: PrimitiveDateTime,
) -> Result<Answer, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "INSERT INTO answers (
            id, attempt_id, exam_id, student_id, question_id, answer_text,
            selected_option_index, audio_keys, stt_status, evaluation_status,
            created_at, updated_at
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9,$10,$10)
        ON CONFLICT (attempt_id, question_id) DO UPDATE
        SET answer_text = EXCLUDED.answer_text,
            selected_option_index = EXCLUDED.selected_option_index,
            audio_keys = CASE
                WHEN jsonb_array_length(EXCLUDED.audio_keys) = 0 THEN answers.audio_keys
                ELSE EXCLUDED.audio_keys
            END,
            updated_at = EXCLUDED.updated_at
        RETURNING {COLUMNS}"
    ))
    .bind(answer.id)
    .bind(answer.attempt_id)
    .bind(answer.exam_id)
    .bind(answer.student_id)
    .bind(answer.question_id)
    .bind(answer.answer_text)
    .bind(answer.selected_option_index)
    .bind(Json(answer.audio_keys))
    .bind(StageStatus::Pending)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn list_by_attempt(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "SELECT {COLUMNS} FROM answers WHERE attempt_id = $1 ORDER BY created_at, id"
    ))
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn record_transcription(
    pool: &PgPool,
    id: &str,
    update: &TranscriptionUpdate,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE answers
         SET transcribed_text = COALESCE($1, transcribed_text),
             stt_status = $2,
             stt_error = $3,
             stt_timestamp = $4,
             updated_at = $5
         WHERE id = $6",
    )
    .bind(update.transcribed_text.as_deref())
    .bind(update.stt_status)
    .bind(update.stt_error.as_deref())
    .bind(update.stt_timestamp)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn record_evaluation(
    pool: &PgPool,
    id: &str,
    update: &EvaluationUpdate,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE answers
         SET score = $1,
             max_marks = $2,
             evaluation_feedback = $3,
             evaluation_model = $4,
             evaluation_status = $5,
             evaluated_at = $6,
             updated_at = $7
         WHERE id = $8",
    )
    .bind(update.score)
    .bind(update.max_marks)
    .bind(update.feedback.as_deref())
    .bind(update.model.as_deref())
    .bind(update.status)
    .bind(update.evaluated_at)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
