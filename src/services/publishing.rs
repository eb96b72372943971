use std::collections::HashSet;

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::db::models::{Exam, Question, QuestionAiState};
use crate::db::types::{ExamStatus, QuestionType};
use crate::repositories::{NewExam, NewQuestion, QuestionContent};
use crate::services::errors::LifecycleError;
use crate::tasks::enrichment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PublishOutcome {
    Published { enrichment_jobs: usize },
    Rejected { pending: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct ExamDraft {
    pub(crate) teacher_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) points_total: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct QuestionDraft {
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
}

pub(crate) async fn owned_exam(
    state: &AppState,
    exam_id: &str,
    teacher_id: &str,
) -> Result<Exam, LifecycleError> {
    let exam = state.store().find_exam(exam_id).await?.ok_or(LifecycleError::NotFound("exam"))?;
    if exam.teacher_id != teacher_id {
        return Err(LifecycleError::Forbidden("exam belongs to another teacher"));
    }
    Ok(exam)
}

pub(crate) async fn create_exam(
    state: &AppState,
    draft: ExamDraft,
    now: PrimitiveDateTime,
) -> Result<Exam, LifecycleError> {
    if let (Some(start), Some(end)) = (draft.start_time, draft.end_time) {
        if end <= start {
            return Err(LifecycleError::Invalid("end_time must be after start_time".into()));
        }
    }
    if draft.duration_minutes.is_none() && draft.end_time.is_none() {
        return Err(LifecycleError::Invalid("an exam needs a duration or an end time".into()));
    }

    let exam = state
        .store()
        .create_exam(NewExam {
            id: Uuid::new_v4().to_string(),
            teacher_id: draft.teacher_id,
            title: draft.title,
            description: draft.description,
            start_time: draft.start_time,
            end_time: draft.end_time,
            duration_minutes: draft.duration_minutes,
            points_total: draft.points_total,
            created_at: now,
        })
        .await?;

    tracing::info!(exam_id = %exam.id, teacher_id = %exam.teacher_id, "Exam created");
    Ok(exam)
}

/// Creates a question with its AI state fully initialised for its type.
pub(crate) async fn create_question(
    state: &AppState,
    draft: QuestionDraft,
    now: PrimitiveDateTime,
) -> Result<Question, LifecycleError> {
    let exam = owned_exam(state, &draft.exam_id, &draft.teacher_id).await?;
    if exam.status != ExamStatus::Draft {
        return Err(LifecycleError::InvalidState("questions can only be added to a draft exam".into()));
    }
    if !draft.marks.is_finite() || draft.marks < 0.0 {
        return Err(LifecycleError::Invalid("marks must be a non-negative number".into()));
    }
    if draft.question_type.is_mcq() {
        let option_count = draft.options.len();
        if !(2..=4).contains(&option_count) {
            return Err(LifecycleError::Invalid("mcq questions need 2 to 4 options".into()));
        }
        let valid_index = draft
            .correct_option_index
            .is_some_and(|index| index >= 0 && (index as usize) < option_count);
        if !valid_index {
            return Err(LifecycleError::Invalid("correct option index is out of range".into()));
        }
    }

    let ai = QuestionAiState::initial(draft.question_type);
    let is_ready_for_publish = ai.is_ready(draft.question_type, draft.requires_audio);
    let question = state
        .store()
        .create_question(NewQuestion {
            id: Uuid::new_v4().to_string(),
            exam_id: draft.exam_id,
            teacher_id: draft.teacher_id,
            order_index: draft.order_index,
            text: draft.text,
            question_type: draft.question_type,
            options: draft.options,
            correct_option_index: draft.correct_option_index,
            marks: draft.marks,
            expected_answer: draft.expected_answer,
            requires_audio: draft.requires_audio,
            ai,
            is_ready_for_publish,
            created_at: now,
        })
        .await?;

    tracing::info!(
        exam_id = %question.exam_id,
        question_id = %question.id,
        question_type = ?question.question_type,
        ready = question.is_ready_for_publish,
        "Question created"
    );
    Ok(question)
}

/// Publish intent: schedules enrichment for every question of a draft exam.
pub(crate) async fn request_enrichment(
    state: &AppState,
    exam_id: &str,
    teacher_id: &str,
) -> Result<usize, LifecycleError> {
    let exam = owned_exam(state, exam_id, teacher_id).await?;
    if exam.status != ExamStatus::Draft {
        return Err(LifecycleError::InvalidState(format!(
            "exam is {:?}, enrichment runs before publishing",
            exam.status
        )));
    }

    let question_ids: Vec<String> =
        state.store().list_questions(exam_id).await?.into_iter().map(|q| q.id).collect();
    let job_ids = enrichment::enqueue_for_questions(
        state.queue().as_ref(),
        state.settings().enrichment(),
        &question_ids,
    )
    .await?;

    tracing::info!(exam_id, jobs = job_ids.len(), "Enrichment requested");
    Ok(job_ids.len())
}

/// Question list with AI status, as shown to the owning teacher.
pub(crate) async fn question_status(
    state: &AppState,
    exam_id: &str,
    teacher_id: &str,
) -> Result<Vec<Question>, LifecycleError> {
    owned_exam(state, exam_id, teacher_id).await?;
    Ok(state.store().list_questions(exam_id).await?)
}

/// Publish gate followed by the draft → published transition.
///
/// A rejection leaves the exam and its questions untouched.
pub(crate) async fn publish_exam(
    state: &AppState,
    exam_id: &str,
    teacher_id: &str,
    finalized: Vec<QuestionContent>,
    now: PrimitiveDateTime,
) -> Result<PublishOutcome, LifecycleError> {
    let exam = owned_exam(state, exam_id, teacher_id).await?;
    if exam.status != ExamStatus::Draft {
        return Err(LifecycleError::InvalidState(format!("exam is already {:?}", exam.status)));
    }

    let questions = state.store().list_questions(exam_id).await?;
    let pending = questions.iter().filter(|question| !question.is_ready_for_publish).count();
    if pending > 0 {
        metrics::counter!("publish_rejected_total").increment(1);
        tracing::info!(exam_id, pending, "Publish rejected; questions still being prepared");
        return Ok(PublishOutcome::Rejected { pending });
    }

    let known: HashSet<&str> = questions.iter().map(|question| question.id.as_str()).collect();
    if let Some(unknown) = finalized.iter().find(|content| !known.contains(content.question_id.as_str())) {
        return Err(LifecycleError::Invalid(format!(
            "question {} is not part of exam {exam_id}",
            unknown.question_id
        )));
    }

    for content in &finalized {
        state.store().update_question_content(content, now).await?;
    }
    if !state.store().publish_exam(exam_id, now).await? {
        return Err(LifecycleError::InvalidState("exam is no longer a draft".into()));
    }

    let question_ids: Vec<String> = if finalized.is_empty() {
        questions.into_iter().map(|question| question.id).collect()
    } else {
        let mut ordered = finalized;
        ordered.sort_by_key(|content| content.order_index);
        ordered.into_iter().map(|content| content.question_id).collect()
    };
    // The exam is already published at this point; a scheduling failure is reported, not returned.
    let enrichment_jobs = match enrichment::enqueue_for_questions(
        state.queue().as_ref(),
        state.settings().enrichment(),
        &question_ids,
    )
    .await
    {
        Ok(job_ids) => job_ids.len(),
        Err(err) => {
            tracing::error!(exam_id, error = %err, "Exam published but enrichment could not be scheduled");
            0
        }
    };

    tracing::info!(exam_id, questions = question_ids.len(), enrichment_jobs, "Exam published");
    Ok(PublishOutcome::Published { enrichment_jobs })
}

pub(crate) async fn archive_exam(
    state: &AppState,
    exam_id: &str,
    teacher_id: &str,
    now: PrimitiveDateTime,
) -> Result<(), LifecycleError> {
    owned_exam(state, exam_id, teacher_id).await?;
    if !state.store().archive_exam(exam_id, now).await? {
        return Err(LifecycleError::InvalidState("only published exams can be archived".into()));
    }
    tracing::info!(exam_id, "Exam archived");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;
    use crate::db::types::AudioStatus;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::repositories::{AiStateUpdate, Store};
    use crate::tasks::queue::{
        FailOutcome, Job, JobOptions, JobQueue, QueueError, ENRICHMENT_QUEUE,
    };
    use crate::test_support::{self, InMemoryStore, MemoryAudioStorage, TestHarness};

    /// Queue whose backend is down.
    struct UnavailableQueue;

    #[async_trait]
    impl JobQueue for UnavailableQueue {
        async fn enqueue(
            &self,
            _queue: &str,
            _name: &str,
            _payload: Value,
            _options: JobOptions,
        ) -> Result<String, QueueError> {
            Err(QueueError::Unavailable("connection refused".into()))
        }

        async fn claim(&self, _queue: &str) -> Result<Option<Job>, QueueError> {
            Ok(None)
        }

        async fn complete(&self, _job: &Job) -> Result<(), QueueError> {
            Ok(())
        }

        async fn fail(&self, _job: &Job, _error: &str) -> Result<FailOutcome, QueueError> {
            Ok(FailOutcome::Exhausted)
        }

        async fn failed_jobs(&self, _queue: &str) -> Result<Vec<Job>, QueueError> {
            Ok(Vec::new())
        }

        async fn requeue_stalled(
            &self,
            _queue: &str,
            _stalled_after: Duration,
        ) -> Result<usize, QueueError> {
            Ok(0)
        }
    }

    fn mcq_draft(exam_id: &str, options: usize, correct: Option<i32>) -> QuestionDraft {
        QuestionDraft {
            exam_id: exam_id.to_string(),
            teacher_id: "teacher-1".to_string(),
            order_index: 0,
            text: "Pick one".to_string(),
            question_type: QuestionType::Mcq,
            options: (0..options).map(|index| format!("option {index}")).collect(),
            correct_option_index: correct,
            marks: 1.0,
            expected_answer: None,
            requires_audio: false,
        }
    }

    async fn mark_audio_done(harness: &TestHarness, question: &Question) {
        let mut ai = question.ai.clone();
        ai.audio_status = AudioStatus::Done;
        ai.rubric_status = crate::db::types::RubricStatus::Skipped;
        let update = AiStateUpdate {
            is_ready_for_publish: ai.is_ready(question.question_type, question.requires_audio),
            ai,
            tts_generated: true,
            tts_audio_key: Some(format!("tts/{}.mp3", question.id)),
            rubric: None,
        };
        harness.store.update_question_ai(&question.id, &update, primitive_now_utc()).await.unwrap();
    }

    #[tokio::test]
    async fn mcq_shape_is_validated() {
        let harness = TestHarness::new().await;
        let exam = test_support::seed_exam(&harness.state, "teacher-1").await;
        let now = primitive_now_utc();

        for (options, correct) in [(1, Some(0)), (5, Some(0)), (4, Some(4)), (3, None), (2, Some(-1))] {
            let result =
                create_question(&harness.state, mcq_draft(&exam.id, options, correct), now).await;
            assert!(matches!(result, Err(LifecycleError::Invalid(_))), "{options} / {correct:?}");
        }
        for options in 2..=4 {
            let question =
                create_question(&harness.state, mcq_draft(&exam.id, options, Some(1)), now)
                    .await
                    .unwrap();
            assert!(question.is_ready_for_publish);
        }
    }

    #[tokio::test]
    async fn only_the_owner_can_add_questions() {
        let harness = TestHarness::new().await;
        let exam = test_support::seed_exam(&harness.state, "teacher-1").await;
        let mut draft = mcq_draft(&exam.id, 2, Some(0));
        draft.teacher_id = "teacher-2".to_string();

        let result = create_question(&harness.state, draft, primitive_now_utc()).await;
        assert!(matches!(result, Err(LifecycleError::Forbidden(_))));
    }

    #[tokio::test]
    async fn exam_needs_a_duration_or_end_time() {
        let harness = TestHarness::new().await;
        let draft = ExamDraft {
            teacher_id: "teacher-1".to_string(),
            title: "Open".to_string(),
            description: None,
            start_time: None,
            end_time: None,
            duration_minutes: None,
            points_total: 1.0,
        };

        let result = create_exam(&harness.state, draft, primitive_now_utc()).await;
        assert!(matches!(result, Err(LifecycleError::Invalid(_))));
    }

    #[tokio::test]
    async fn publish_is_rejected_until_every_question_is_ready() {
        let harness = TestHarness::new().await;
        let exam = test_support::seed_exam(&harness.state, "teacher-1").await;
        test_support::seed_mcq(&harness.state, &exam.id, "teacher-1", 0, 0).await;
        let viva = test_support::seed_open_question(
            &harness.state, &exam.id, "teacher-1", 1, QuestionType::Viva, true, 5.0,
        )
        .await;

        let outcome =
            publish_exam(&harness.state, &exam.id, "teacher-1", Vec::new(), primitive_now_utc())
                .await
                .unwrap();
        assert_eq!(outcome, PublishOutcome::Rejected { pending: 1 });
        let stored = harness.store.find_exam(&exam.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExamStatus::Draft);
        assert!(harness.queue.claim(ENRICHMENT_QUEUE).await.unwrap().is_none());

        mark_audio_done(&harness, &viva).await;
        let outcome =
            publish_exam(&harness.state, &exam.id, "teacher-1", Vec::new(), primitive_now_utc())
                .await
                .unwrap();
        assert_eq!(outcome, PublishOutcome::Published { enrichment_jobs: 2 });
        let stored = harness.store.find_exam(&exam.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExamStatus::Published);
        assert!(stored.published_at.is_some());

        let again =
            publish_exam(&harness.state, &exam.id, "teacher-1", Vec::new(), primitive_now_utc())
                .await;
        assert!(matches!(again, Err(LifecycleError::InvalidState(_))));
    }

    #[tokio::test]
    async fn publish_succeeds_when_enrichment_cannot_be_scheduled() {
        let settings = test_support::test_settings(&[]).await;
        let store = Arc::new(InMemoryStore::default());
        let state = AppState::new(
            settings,
            store.clone(),
            Arc::new(UnavailableQueue),
            Arc::new(MemoryAudioStorage::default()),
            None,
        );
        let exam = test_support::seed_exam(&state, "teacher-1").await;
        test_support::seed_mcq(&state, &exam.id, "teacher-1", 0, 1).await;

        let outcome = publish_exam(&state, &exam.id, "teacher-1", Vec::new(), primitive_now_utc()).await;
        assert_eq!(outcome.unwrap(), PublishOutcome::Published { enrichment_jobs: 0 });
        let stored = store.find_exam(&exam.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExamStatus::Published);
    }

    #[tokio::test]
    async fn publish_writes_finalized_content() {
        let harness = TestHarness::new().await;
        let exam = test_support::seed_exam(&harness.state, "teacher-1").await;
        let first = test_support::seed_mcq(&harness.state, &exam.id, "teacher-1", 0, 0).await;
        let second = test_support::seed_mcq(&harness.state, &exam.id, "teacher-1", 1, 0).await;

        let unknown = vec![QuestionContent {
            question_id: "elsewhere".to_string(),
            text: "x".to_string(),
            options: Vec::new(),
            order_index: 0,
        }];
        let result =
            publish_exam(&harness.state, &exam.id, "teacher-1", unknown, primitive_now_utc()).await;
        assert!(matches!(result, Err(LifecycleError::Invalid(_))));

        let finalized = vec![
            QuestionContent {
                question_id: second.id.clone(),
                text: "Now first".to_string(),
                options: vec!["yes".into(), "no".into()],
                order_index: 0,
            },
            QuestionContent {
                question_id: first.id.clone(),
                text: "Now second".to_string(),
                options: vec!["up".into(), "down".into()],
                order_index: 1,
            },
        ];
        publish_exam(&harness.state, &exam.id, "teacher-1", finalized, primitive_now_utc())
            .await
            .unwrap();

        let questions = harness.store.list_questions(&exam.id).await.unwrap();
        assert_eq!(questions[0].id, second.id);
        assert_eq!(questions[0].text, "Now first");
        assert_eq!(questions[1].options.0, vec!["up".to_string(), "down".to_string()]);
    }

    #[tokio::test]
    async fn enrichment_requests_are_only_accepted_for_drafts() {
        let harness = TestHarness::new().await;
        let exam = test_support::seed_exam(&harness.state, "teacher-1").await;
        test_support::seed_mcq(&harness.state, &exam.id, "teacher-1", 0, 0).await;
        test_support::seed_mcq(&harness.state, &exam.id, "teacher-1", 1, 0).await;

        let jobs = request_enrichment(&harness.state, &exam.id, "teacher-1").await.unwrap();
        assert_eq!(jobs, 2);

        harness.publish(&exam.id, "teacher-1").await;
        let result = request_enrichment(&harness.state, &exam.id, "teacher-1").await;
        assert!(matches!(result, Err(LifecycleError::InvalidState(_))));
    }

    #[tokio::test]
    async fn archive_requires_a_published_exam() {
        let harness = TestHarness::new().await;
        let exam = test_support::seed_exam(&harness.state, "teacher-1").await;

        let result = archive_exam(&harness.state, &exam.id, "teacher-1", primitive_now_utc()).await;
        assert!(matches!(result, Err(LifecycleError::InvalidState(_))));

        harness.publish(&exam.id, "teacher-1").await;
        archive_exam(&harness.state, &exam.id, "teacher-1", primitive_now_utc()).await.unwrap();
        let stored = harness.store.find_exam(&exam.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExamStatus::Archived);
    }
}
