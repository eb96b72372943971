use std::collections::HashMap;

use time::PrimitiveDateTime;

use crate::core::state::AppState;
use crate::db::models::{Answer, Attempt, Exam, Question};
use crate::db::types::AttemptStatus;
use crate::services::attempts;
use crate::services::errors::LifecycleError;
use crate::services::publishing::owned_exam;

#[derive(Debug, Clone)]
pub(crate) struct AnswerResult {
    pub(crate) answer: Answer,
    /// `None` when the question was deleted after the answer was graded.
    pub(crate) question: Option<Question>,
}

#[derive(Debug, Clone)]
pub(crate) struct AttemptResult {
    pub(crate) attempt: Attempt,
    pub(crate) answers: Vec<AnswerResult>,
}

#[derive(Debug, Clone)]
pub(crate) struct ExamResults {
    pub(crate) exam: Exam,
    pub(crate) attempts: Vec<AttemptResult>,
}

/// Every attempt of the exam with per-answer grading, for the owning teacher.
pub(crate) async fn exam_results(
    state: &AppState,
    exam_id: &str,
    teacher_id: &str,
) -> Result<ExamResults, LifecycleError> {
    let exam = owned_exam(state, exam_id, teacher_id).await?;
    let questions = questions_by_id(state, exam_id).await?;

    let mut results = Vec::new();
    for attempt in state.store().list_attempts(exam_id).await? {
        let answers = state.store().list_answers(&attempt.id).await?;
        results.push(AttemptResult { answers: join_questions(answers, &questions), attempt });
    }

    Ok(ExamResults { exam, attempts: results })
}

/// The student's own graded attempt. Only available once evaluation has finished.
pub(crate) async fn attempt_results(
    state: &AppState,
    attempt_id: &str,
    student_id: &str,
    now: PrimitiveDateTime,
) -> Result<(Exam, AttemptResult), LifecycleError> {
    let attempt = attempts::read_attempt(state, attempt_id, student_id, now).await?;
    if attempt.status != AttemptStatus::Evaluated {
        return Err(LifecycleError::InvalidState(format!(
            "results are not available while the attempt is {:?}",
            attempt.status
        )));
    }

    let exam = state
        .store()
        .find_exam(&attempt.exam_id)
        .await?
        .ok_or(LifecycleError::NotFound("exam"))?;
    let questions = questions_by_id(state, &exam.id).await?;
    let answers = state.store().list_answers(&attempt.id).await?;

    Ok((exam, AttemptResult { answers: join_questions(answers, &questions), attempt }))
}

async fn questions_by_id(
    state: &AppState,
    exam_id: &str,
) -> Result<HashMap<String, Question>, LifecycleError> {
    Ok(state
        .store()
        .list_questions(exam_id)
        .await?
        .into_iter()
        .map(|question| (question.id.clone(), question))
        .collect())
}

/// Pairs answers with their questions, in question order. Orphaned answers go last.
fn join_questions(
    answers: Vec<Answer>,
    questions: &HashMap<String, Question>,
) -> Vec<AnswerResult> {
    let mut joined: Vec<AnswerResult> = answers
        .into_iter()
        .map(|answer| AnswerResult { question: questions.get(&answer.question_id).cloned(), answer })
        .collect();
    joined.sort_by_key(|result| {
        result.question.as_ref().map_or(i32::MAX, |question| question.order_index)
    });
    joined
}
