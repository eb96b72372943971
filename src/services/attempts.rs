use std::collections::HashSet;

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::attempt_deadline;
use crate::db::models::Attempt;
use crate::db::types::{AttemptStatus, ExamStatus};
use crate::repositories::{AnswerInput, NewAttempt};
use crate::services::errors::LifecycleError;
use crate::services::storage::{answer_audio_key, StoredObject, AUDIO_CONTENT_TYPE};
use crate::tasks::{transcription, AttemptJob};

#[derive(Debug, Clone, Default)]
pub(crate) struct SubmittedAnswer {
    pub(crate) question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_option_index: Option<i32>,
    pub(crate) audio_keys: Vec<String>,
}

/// Starts the student's attempt, or returns the one already in progress.
pub(crate) async fn start_attempt(
    state: &AppState,
    exam_id: &str,
    student_id: &str,
    now: PrimitiveDateTime,
) -> Result<Attempt, LifecycleError> {
    if let Some(existing) = state.store().find_attempt_for_student(exam_id, student_id).await? {
        let existing = expire_if_overdue(state, existing, now).await?;
        if existing.status != AttemptStatus::InProgress {
            return Err(LifecycleError::AlreadyStarted);
        }
        return Ok(existing);
    }

    let exam = state.store().find_exam(exam_id).await?.ok_or(LifecycleError::NotFound("exam"))?;
    if exam.status != ExamStatus::Published {
        return Err(LifecycleError::WindowClosed);
    }
    let opened = exam.start_time.map_or(true, |start| now >= start);
    let not_closed = exam.end_time.map_or(true, |end| now < end);
    if !opened || !not_closed {
        return Err(LifecycleError::WindowClosed);
    }

    let deadline_at = match (exam.duration_minutes, exam.end_time) {
        (Some(minutes), end) => attempt_deadline(now, minutes, end),
        (None, Some(end)) => end,
        (None, None) => {
            return Err(LifecycleError::InvalidState(
                "exam has neither a duration nor an end time".into(),
            ))
        }
    };

    let created = state
        .store()
        .create_attempt(NewAttempt {
            id: Uuid::new_v4().to_string(),
            exam_id: exam_id.to_string(),
            student_id: student_id.to_string(),
            started_at: now,
            deadline_at,
        })
        .await?;

    let attempt = state
        .store()
        .find_attempt_for_student(exam_id, student_id)
        .await?
        .ok_or(LifecycleError::NotFound("attempt"))?;
    if created {
        tracing::info!(exam_id, student_id, attempt_id = %attempt.id, "Attempt started");
    }
    Ok(attempt)
}

/// Reads an attempt, expiring it when its deadline has passed.
pub(crate) async fn read_attempt(
    state: &AppState,
    attempt_id: &str,
    student_id: &str,
    now: PrimitiveDateTime,
) -> Result<Attempt, LifecycleError> {
    let attempt =
        state.store().find_attempt(attempt_id).await?.ok_or(LifecycleError::NotFound("attempt"))?;
    if attempt.student_id != student_id {
        return Err(LifecycleError::Forbidden("attempt belongs to another student"));
    }
    expire_if_overdue(state, attempt, now).await
}

async fn expire_if_overdue(
    state: &AppState,
    attempt: Attempt,
    now: PrimitiveDateTime,
) -> Result<Attempt, LifecycleError> {
    if attempt.status != AttemptStatus::InProgress || now <= attempt.deadline_at {
        return Ok(attempt);
    }

    if state.store().advance_attempt(&attempt.id, AttemptStatus::Expired, now).await? {
        metrics::counter!("attempts_expired_total").increment(1);
        tracing::info!(attempt_id = %attempt.id, "Attempt expired");
    }
    state.store().find_attempt(&attempt.id).await?.ok_or(LifecycleError::NotFound("attempt"))
}

/// Persists answers, marks the attempt submitted and schedules transcription.
pub(crate) async fn submit_attempt(
    state: &AppState,
    attempt_id: &str,
    student_id: &str,
    mut answers: Vec<SubmittedAnswer>,
    now: PrimitiveDateTime,
) -> Result<Attempt, LifecycleError> {
    let attempt = read_attempt(state, attempt_id, student_id, now).await?;
    match attempt.status {
        AttemptStatus::InProgress => {}
        AttemptStatus::Expired => return Err(LifecycleError::DeadlinePassed),
        status => {
            return Err(LifecycleError::InvalidState(format!("attempt is already {status:?}")))
        }
    }

    let question_ids: HashSet<String> = state
        .store()
        .list_questions(&attempt.exam_id)
        .await?
        .into_iter()
        .map(|question| question.id)
        .collect();
    if let Some(unknown) = answers.iter().find(|answer| !question_ids.contains(&answer.question_id)) {
        return Err(LifecycleError::Invalid(format!(
            "question {} is not part of this exam",
            unknown.question_id
        )));
    }

    // Recordings only ever live at the key derived from this attempt's exam, student and question.
    for answer in &mut answers {
        let own_key = answer_audio_key(&attempt.exam_id, &attempt.student_id, &answer.question_id);
        if let Some(foreign) = answer.audio_keys.iter().find(|key| **key != own_key) {
            return Err(LifecycleError::Invalid(format!(
                "audio key {foreign} does not belong to question {} of this attempt",
                answer.question_id
            )));
        }
        answer.audio_keys.dedup();
    }

    for answer in answers {
        state
            .store()
            .upsert_answer(
                AnswerInput {
                    id: Uuid::new_v4().to_string(),
                    attempt_id: attempt.id.clone(),
                    exam_id: attempt.exam_id.clone(),
                    student_id: attempt.student_id.clone(),
                    question_id: answer.question_id,
                    answer_text: answer.answer_text,
                    selected_option_index: answer.selected_option_index,
                    audio_keys: answer.audio_keys,
                },
                now,
            )
            .await?;
    }

    if !state.store().mark_attempt_submitted(&attempt.id, now).await? {
        return Err(LifecycleError::InvalidState("attempt is no longer in progress".into()));
    }

    let job = AttemptJob {
        exam_id: attempt.exam_id.clone(),
        student_id: attempt.student_id.clone(),
        attempt_id: attempt.id.clone(),
    };
    let job_id =
        transcription::enqueue(state.queue().as_ref(), state.settings().submission(), &job).await?;
    tracing::info!(attempt_id, job_id = %job_id, "Attempt submitted; transcription scheduled");

    state.store().find_attempt(&attempt.id).await?.ok_or(LifecycleError::NotFound("attempt"))
}

/// Stores a recorded answer at its derivable key while the attempt is still open.
pub(crate) async fn store_answer_audio(
    state: &AppState,
    attempt_id: &str,
    student_id: &str,
    question_id: &str,
    audio: Vec<u8>,
    now: PrimitiveDateTime,
) -> Result<StoredObject, LifecycleError> {
    let attempt = read_attempt(state, attempt_id, student_id, now).await?;
    match attempt.status {
        AttemptStatus::InProgress => {}
        AttemptStatus::Expired => return Err(LifecycleError::DeadlinePassed),
        status => {
            return Err(LifecycleError::InvalidState(format!("attempt is already {status:?}")))
        }
    }

    let question =
        state.store().find_question(question_id).await?.ok_or(LifecycleError::NotFound("question"))?;
    if question.exam_id != attempt.exam_id {
        return Err(LifecycleError::NotFound("question"));
    }
    if audio.is_empty() {
        return Err(LifecycleError::Invalid("audio upload is empty".into()));
    }

    let key = answer_audio_key(&attempt.exam_id, &attempt.student_id, question_id);
    let stored = state.storage().put(&key, AUDIO_CONTENT_TYPE, audio).await?;
    tracing::info!(attempt_id, question_id, size = stored.size, "Answer audio stored");
    Ok(stored)
}

/// Expires in-progress attempts whose deadline passed. Returns how many were flipped.
pub(crate) async fn expire_overdue(
    state: &AppState,
    now: PrimitiveDateTime,
    limit: i64,
) -> Result<usize, LifecycleError> {
    let mut expired = 0;
    for attempt_id in state.store().list_overdue_attempts(now, limit).await? {
        if state.store().advance_attempt(&attempt_id, AttemptStatus::Expired, now).await? {
            expired += 1;
        }
    }
    if expired > 0 {
        metrics::counter!("attempts_expired_total").increment(expired as u64);
        tracing::info!(expired, "Overdue attempts expired");
    }
    Ok(expired)
}
