use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Exam;
use crate::db::types::ExamStatus;
use crate::repositories::NewExam;

pub(crate) const COLUMNS: &str = "\
    id, teacher_id, title, description, status, start_time, end_time, duration_minutes, \
    points_total, created_at, updated_at, published_at";

pub(crate) async fn create(pool: &PgPool, exam: NewExam) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, teacher_id, title, description, status, start_time, end_time,
            duration_minutes, points_total, created_at, updated_at
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$10)
        RETURNING {COLUMNS}"
    ))
    .bind(exam.id)
    .bind(exam.teacher_id)
    .bind(exam.title)
    .bind(exam.description)
    .bind(ExamStatus::Draft)
    .bind(exam.start_time)
    .bind(exam.end_time)
    .bind(exam.duration_minutes)
    .bind(exam.points_total)
    .bind(exam.created_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Flips a draft exam to published. Returns false when the exam was not a draft.
pub(crate) async fn publish(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams SET status = $1, published_at = $2, updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(ExamStatus::Published)
    .bind(now)
    .bind(id)
    .bind(ExamStatus::Draft)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn archive(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
    )
    .bind(ExamStatus::Archived)
    .bind(now)
    .bind(id)
    .bind(ExamStatus::Published)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
