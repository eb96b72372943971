use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;
use crate::repositories::NewAttempt;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, status, started_at, deadline_at, finished_at, total_score, \
    max_score, created_at, updated_at";

pub(crate) async fn create(pool: &PgPool, attempt: NewAttempt) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO attempts (
            id, exam_id, student_id, status, started_at, deadline_at, created_at, updated_at
        )
        VALUES ($1,$2,$3,$4,$5,$6,$5,$5)
        ON CONFLICT (exam_id, student_id) DO NOTHING",
    )
    .bind(attempt.id)
    .bind(attempt.exam_id)
    .bind(attempt.student_id)
    .bind(AttemptStatus::InProgress)
    .bind(attempt.started_at)
    .bind(attempt.deadline_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_for_student(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE exam_id = $1 AND student_id = $2"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_exam(pool: &PgPool, exam_id: &str) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE exam_id = $1 ORDER BY started_at, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

/// Conditional status update guarded by the target's allowed predecessors.
pub(crate) async fn advance(
    pool: &PgPool,
    id: &str,
    status: AttemptStatus,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE attempts SET status = ");
    builder.push_bind(status);
    builder.push(", updated_at = ");
    builder.push_bind(now);
    if status == AttemptStatus::Expired {
        builder.push(", finished_at = COALESCE(finished_at, ");
        builder.push_bind(now);
        builder.push(")");
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND status IN (");
    let mut separated = builder.separated(", ");
    for predecessor in status.predecessors() {
        separated.push_bind(*predecessor);
    }
    separated.push_unseparated(")");

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn mark_submitted(
    pool: &PgPool,
    id: &str,
    finished_at: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts SET status = $1, finished_at = $2, updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(AttemptStatus::Submitted)
    .bind(finished_at)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn finalize(
    pool: &PgPool,
    id: &str,
    total_score: f64,
    max_score: f64,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts
         SET status = $1, total_score = $2, max_score = $3,
             finished_at = COALESCE(finished_at, $4), updated_at = $4
         WHERE id = $5 AND status IN ($6, $7, $1)",
    )
    .bind(AttemptStatus::Evaluated)
    .bind(total_score)
    .bind(max_score)
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::Submitted)
    .bind(AttemptStatus::Transcribed)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_overdue(
    pool: &PgPool,
    now: PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM attempts WHERE status = $1 AND deadline_at < $2
         ORDER BY deadline_at LIMIT $3",
    )
    .bind(AttemptStatus::InProgress)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}
