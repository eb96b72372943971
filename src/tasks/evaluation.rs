use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::core::config::SubmissionSettings;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, Question};
use crate::db::types::StageStatus;
use crate::repositories::{EvaluationUpdate, Store};
use crate::services::answer_evaluation::{AnswerEvaluator, EvaluationRequest};
use crate::services::errors::ServiceError;
use crate::tasks::queue::{Job, JobOptions, JobQueue, QueueError, EVALUATION_QUEUE};
use crate::tasks::worker::JobHandler;
use crate::tasks::AttemptJob;

pub(crate) const JOB_TYPE: &str = "evaluate-answers";

pub(crate) const NO_SELECTION_FEEDBACK: &str = "No answer selected.";
pub(crate) const CORRECT_FEEDBACK: &str = "Correct answer.";
pub(crate) const INCORRECT_FEEDBACK: &str = "Incorrect answer.";
pub(crate) const MANUAL_REVIEW_FEEDBACK: &str =
    "AI evaluation is not configured. Please review manually.";

pub(crate) async fn enqueue(
    queue: &dyn JobQueue,
    settings: &SubmissionSettings,
    job: &AttemptJob,
) -> Result<String, QueueError> {
    let options =
        JobOptions::new(settings.evaluation_delay_ms, settings.max_attempts, settings.backoff_base_ms);
    queue.enqueue(EVALUATION_QUEUE, JOB_TYPE, serde_json::to_value(job)?, options).await
}

/// Deterministic multiple-choice scoring.
pub(crate) fn score_mcq(
    selected: Option<i32>,
    correct: Option<i32>,
    max_marks: f64,
) -> (f64, &'static str) {
    match selected {
        None => (0.0, NO_SELECTION_FEEDBACK),
        Some(selected) if Some(selected) == correct => (max_marks, CORRECT_FEEDBACK),
        Some(_) => (0.0, INCORRECT_FEEDBACK),
    }
}

pub(crate) fn clamp_score(score: f64, max_marks: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(0.0, max_marks.max(0.0))
}

pub(crate) struct EvaluationHandler {
    store: Arc<dyn Store>,
    evaluator: Arc<dyn AnswerEvaluator>,
}

impl EvaluationHandler {
    pub(crate) fn new(store: Arc<dyn Store>, evaluator: Arc<dyn AnswerEvaluator>) -> Self {
        Self { store, evaluator }
    }

    pub(crate) async fn evaluate_attempt(&self, payload: &AttemptJob) -> Result<()> {
        let attempt_id = payload.attempt_id.as_str();
        let attempt = self
            .store
            .find_attempt(attempt_id)
            .await
            .with_context(|| format!("Failed to load attempt {attempt_id}"))?
            .with_context(|| format!("Attempt {attempt_id} not found"))?;
        let exam = self
            .store
            .find_exam(&attempt.exam_id)
            .await
            .with_context(|| format!("Failed to load exam {}", attempt.exam_id))?
            .with_context(|| format!("Exam {} not found", attempt.exam_id))?;

        let questions: HashMap<String, Question> = self
            .store
            .list_questions(&exam.id)
            .await
            .context("Failed to load exam questions")?
            .into_iter()
            .map(|question| (question.id.clone(), question))
            .collect();
        let answers = self
            .store
            .list_answers(&attempt.id)
            .await
            .with_context(|| format!("Failed to load answers of attempt {attempt_id}"))?;

        let mut total_score = 0.0;
        for answer in &answers {
            let score = if answer.evaluation_status == StageStatus::Completed {
                answer.score
            } else {
                let update = self.evaluate_answer(answer, questions.get(&answer.question_id)).await;
                self.store
                    .record_evaluation(&answer.id, &update, primitive_now_utc())
                    .await
                    .with_context(|| format!("Failed to store evaluation of answer {}", answer.id))?;
                update.score
            };
            total_score += score.unwrap_or(0.0);
        }

        let finalized = self
            .store
            .finalize_attempt(&attempt.id, total_score, exam.points_total, primitive_now_utc())
            .await
            .context("Failed to finalize attempt")?;
        if finalized {
            tracing::info!(
                attempt_id,
                total_score,
                max_score = exam.points_total,
                answers = answers.len(),
                "Attempt evaluated"
            );
        } else {
            tracing::warn!(attempt_id, status = ?attempt.status, "Attempt not in a state that can be finalized");
        }

        Ok(())
    }

    async fn evaluate_answer(&self, answer: &Answer, question: Option<&Question>) -> EvaluationUpdate {
        let now = primitive_now_utc();
        let Some(question) = question else {
            metrics::counter!("answers_evaluated_total", "status" => "skipped").increment(1);
            return EvaluationUpdate {
                score: None,
                max_marks: None,
                feedback: Some("Question no longer exists.".to_string()),
                model: None,
                status: StageStatus::Skipped,
                evaluated_at: Some(now),
            };
        };

        if question.question_type.is_mcq() {
            let (score, feedback) =
                score_mcq(answer.selected_option_index, question.correct_option_index, question.marks);
            metrics::counter!("answers_evaluated_total", "status" => "completed").increment(1);
            return EvaluationUpdate {
                score: Some(score),
                max_marks: Some(question.marks),
                feedback: Some(feedback.to_string()),
                model: None,
                status: StageStatus::Completed,
                evaluated_at: Some(now),
            };
        }

        let Some(student_answer) = answer.source_text() else {
            metrics::counter!("answers_evaluated_total", "status" => "skipped").increment(1);
            return EvaluationUpdate {
                score: None,
                max_marks: Some(question.marks),
                feedback: Some("No answer provided.".to_string()),
                model: None,
                status: StageStatus::Skipped,
                evaluated_at: Some(now),
            };
        };

        let request = EvaluationRequest {
            question_text: &question.text,
            expected_answer: question.expected_answer.as_deref(),
            student_answer,
            max_marks: question.marks,
        };
        match self.evaluator.evaluate(&request).await {
            Ok(evaluation) => {
                metrics::counter!("answers_evaluated_total", "status" => "completed").increment(1);
                EvaluationUpdate {
                    score: Some(clamp_score(evaluation.score, question.marks)),
                    max_marks: Some(question.marks),
                    feedback: Some(evaluation.feedback),
                    model: Some(evaluation.model),
                    status: StageStatus::Completed,
                    evaluated_at: Some(now),
                }
            }
            Err(err) => {
                metrics::counter!("answers_evaluated_total", "status" => "failed").increment(1);
                tracing::warn!(answer_id = %answer.id, question_id = %question.id, error = %err, "Answer evaluation failed");
                let feedback = match err {
                    ServiceError::Disabled(_) => MANUAL_REVIEW_FEEDBACK.to_string(),
                    other => format!("Evaluation failed ({other}). Please review manually."),
                };
                EvaluationUpdate {
                    score: None,
                    max_marks: Some(question.marks),
                    feedback: Some(feedback),
                    model: None,
                    status: StageStatus::Failed,
                    evaluated_at: Some(now),
                }
            }
        }
    }
}

#[async_trait]
impl JobHandler for EvaluationHandler {
    fn job_type(&self) -> &'static str {
        JOB_TYPE
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let payload: AttemptJob = job.data().context("Invalid evaluate-answers payload")?;
        tracing::info!(
            queue = EVALUATION_QUEUE,
            job_id = %job.id,
            attempt = job.attempt(),
            attempt_id = %payload.attempt_id,
            "Evaluating attempt answers"
        );
        self.evaluate_attempt(&payload).await
    }
}
