use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sqlx::types::Json;
use time::PrimitiveDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::config::Settings;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, Attempt, Exam, Question};
use crate::db::types::{AttemptStatus, ExamStatus, QuestionType, StageStatus};
use crate::repositories::{
    AiStateUpdate, AnswerInput, EvaluationUpdate, NewAttempt, NewExam, NewQuestion,
    QuestionContent, Store, StoreError, TranscriptionUpdate,
};
use crate::services::answer_evaluation::{
    AnswerEvaluator, Evaluation, EvaluationRequest, RubricGenerator,
};
use crate::services::attempts::{self, SubmittedAnswer};
use crate::services::errors::ServiceError;
use crate::services::publishing::{self, ExamDraft, PublishOutcome, QuestionDraft};
use crate::services::speech_synthesis::{SpeechSynthesizer, SynthesisRequest};
use crate::services::speech_to_text::SpeechToText;
use crate::services::storage::{AudioStorage, StoredObject};
use crate::tasks::enrichment::EnrichmentHandler;
use crate::tasks::evaluation::EvaluationHandler;
use crate::tasks::queue::InMemoryJobQueue;
use crate::tasks::scheduler::PipelineServices;
use crate::tasks::AttemptJob;

pub(crate) const FAKE_MODEL: &str = "fake-evaluator";

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("EXAM_ENV", "test");
    std::env::set_var("EXAM_STRICT_CONFIG", "0");
    std::env::set_var("QUEUE_BACKEND", "memory");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::set_var("AWS_EC2_METADATA_DISABLED", "true");
    for name in [
        "TTS_BASE_URL",
        "STT_BASE_URL",
        "OPENAI_API_KEY",
        "S3_ENDPOINT",
        "S3_ACCESS_KEY",
        "S3_SECRET_KEY",
        "S3_BUCKET",
        "S3_REGION",
        "EMBEDDED_WORKERS",
        "ENRICHMENT_STAGGER_MS",
        "ENRICHMENT_MAX_ATTEMPTS",
        "ENRICHMENT_BACKOFF_MS",
        "RUBRIC_GENERATION_ENABLED",
        "TRANSCRIPTION_DELAY_MS",
        "EVALUATION_DELAY_MS",
        "SUBMISSION_MAX_ATTEMPTS",
        "SUBMISSION_BACKOFF_MS",
        "ATTEMPT_EXPIRY_SWEEP_SECONDS",
    ] {
        std::env::remove_var(name);
    }
}

/// Loads settings from the test environment plus `overrides`, restoring the defaults afterwards.
pub(crate) async fn test_settings(overrides: &[(&str, &str)]) -> Settings {
    let _guard = env_lock().await;
    set_test_env();
    for (name, value) in overrides {
        std::env::set_var(name, value);
    }
    let settings = Settings::load().expect("settings");
    set_test_env();
    settings
}

#[derive(Default)]
struct StoreData {
    exams: HashMap<String, Exam>,
    questions: HashMap<String, Question>,
    attempts: HashMap<String, Attempt>,
    answers: Vec<Answer>,
}

/// `Store` over process memory with the same conditional-update semantics as Postgres.
#[derive(Default)]
pub(crate) struct InMemoryStore {
    data: StdMutex<StoreData>,
}

impl InMemoryStore {
    fn with<T>(&self, f: impl FnOnce(&mut StoreData) -> T) -> T {
        let mut guard = self.data.lock().expect("store lock");
        f(&mut guard)
    }

    pub(crate) fn set_attempt_deadline(&self, attempt_id: &str, deadline_at: PrimitiveDateTime) {
        self.with(|data| {
            if let Some(attempt) = data.attempts.get_mut(attempt_id) {
                attempt.deadline_at = deadline_at;
            }
        });
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_exam(&self, exam: NewExam) -> Result<Exam, StoreError> {
        let exam = Exam {
            id: exam.id,
            teacher_id: exam.teacher_id,
            title: exam.title,
            description: exam.description,
            status: ExamStatus::Draft,
            start_time: exam.start_time,
            end_time: exam.end_time,
            duration_minutes: exam.duration_minutes,
            points_total: exam.points_total,
            created_at: exam.created_at,
            updated_at: exam.created_at,
            published_at: None,
        };
        self.with(|data| data.exams.insert(exam.id.clone(), exam.clone()));
        Ok(exam)
    }

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(self.with(|data| data.exams.get(exam_id).cloned()))
    }

    async fn publish_exam(&self, exam_id: &str, now: PrimitiveDateTime) -> Result<bool, StoreError> {
        Ok(self.with(|data| match data.exams.get_mut(exam_id) {
            Some(exam) if exam.status == ExamStatus::Draft => {
                exam.status = ExamStatus::Published;
                exam.published_at = Some(now);
                exam.updated_at = now;
                true
            }
            _ => false,
        }))
    }

    async fn archive_exam(&self, exam_id: &str, now: PrimitiveDateTime) -> Result<bool, StoreError> {
        Ok(self.with(|data| match data.exams.get_mut(exam_id) {
            Some(exam) if exam.status == ExamStatus::Published => {
                exam.status = ExamStatus::Archived;
                exam.updated_at = now;
                true
            }
            _ => false,
        }))
    }

    async fn create_question(&self, question: NewQuestion) -> Result<Question, StoreError> {
        let question = Question {
            id: question.id,
            exam_id: question.exam_id,
            teacher_id: question.teacher_id,
            order_index: question.order_index,
            text: question.text,
            question_type: question.question_type,
            options: Json(question.options),
            correct_option_index: question.correct_option_index,
            marks: question.marks,
            expected_answer: question.expected_answer,
            requires_audio: question.requires_audio,
            ai: question.ai,
            tts_generated: false,
            tts_audio_key: None,
            rubric: None,
            is_ready_for_publish: question.is_ready_for_publish,
            created_at: question.created_at,
            updated_at: question.created_at,
        };
        self.with(|data| data.questions.insert(question.id.clone(), question.clone()));
        Ok(question)
    }

    async fn find_question(&self, question_id: &str) -> Result<Option<Question>, StoreError> {
        Ok(self.with(|data| data.questions.get(question_id).cloned()))
    }

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, StoreError> {
        let mut questions: Vec<Question> = self.with(|data| {
            data.questions.values().filter(|q| q.exam_id == exam_id).cloned().collect()
        });
        questions.sort_by(|a, b| {
            (a.order_index, a.created_at, &a.id).cmp(&(b.order_index, b.created_at, &b.id))
        });
        Ok(questions)
    }

    async fn update_question_content(
        &self,
        content: &QuestionContent,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self.with(|data| match data.questions.get_mut(&content.question_id) {
            Some(question) => {
                question.text = content.text.clone();
                question.options = Json(content.options.clone());
                question.order_index = content.order_index;
                question.updated_at = now;
                true
            }
            None => false,
        }))
    }

    async fn update_question_ai(
        &self,
        question_id: &str,
        update: &AiStateUpdate,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        self.with(|data| {
            if let Some(question) = data.questions.get_mut(question_id) {
                question.ai = update.ai.clone();
                question.tts_generated = update.tts_generated;
                question.tts_audio_key = update.tts_audio_key.clone();
                question.rubric = update.rubric.clone().map(Json);
                question.is_ready_for_publish = update.is_ready_for_publish;
                question.updated_at = now;
            }
        });
        Ok(())
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> Result<bool, StoreError> {
        Ok(self.with(|data| {
            let taken = data.attempts.values().any(|existing| {
                existing.exam_id == attempt.exam_id && existing.student_id == attempt.student_id
            });
            if taken {
                return false;
            }
            data.attempts.insert(
                attempt.id.clone(),
                Attempt {
                    id: attempt.id,
                    exam_id: attempt.exam_id,
                    student_id: attempt.student_id,
                    status: AttemptStatus::InProgress,
                    started_at: attempt.started_at,
                    deadline_at: attempt.deadline_at,
                    finished_at: None,
                    total_score: None,
                    max_score: None,
                    created_at: attempt.started_at,
                    updated_at: attempt.started_at,
                },
            );
            true
        }))
    }

    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        Ok(self.with(|data| data.attempts.get(attempt_id).cloned()))
    }

    async fn find_attempt_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<Attempt>, StoreError> {
        Ok(self.with(|data| {
            data.attempts
                .values()
                .find(|attempt| attempt.exam_id == exam_id && attempt.student_id == student_id)
                .cloned()
        }))
    }

    async fn list_attempts(&self, exam_id: &str) -> Result<Vec<Attempt>, StoreError> {
        let mut attempts: Vec<Attempt> = self.with(|data| {
            data.attempts.values().filter(|attempt| attempt.exam_id == exam_id).cloned().collect()
        });
        attempts.sort_by(|a, b| (a.started_at, &a.id).cmp(&(b.started_at, &b.id)));
        Ok(attempts)
    }

    async fn advance_attempt(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self.with(|data| match data.attempts.get_mut(attempt_id) {
            Some(attempt) if attempt.status.can_advance_to(status) => {
                attempt.status = status;
                attempt.updated_at = now;
                if status == AttemptStatus::Expired {
                    attempt.finished_at.get_or_insert(now);
                }
                true
            }
            _ => false,
        }))
    }

    async fn mark_attempt_submitted(
        &self,
        attempt_id: &str,
        finished_at: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self.with(|data| match data.attempts.get_mut(attempt_id) {
            Some(attempt) if attempt.status == AttemptStatus::InProgress => {
                attempt.status = AttemptStatus::Submitted;
                attempt.finished_at = Some(finished_at);
                attempt.updated_at = finished_at;
                true
            }
            _ => false,
        }))
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        total_score: f64,
        max_score: f64,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self.with(|data| match data.attempts.get_mut(attempt_id) {
            Some(attempt) if attempt.status.can_advance_to(AttemptStatus::Evaluated) => {
                attempt.status = AttemptStatus::Evaluated;
                attempt.total_score = Some(total_score);
                attempt.max_score = Some(max_score);
                attempt.finished_at.get_or_insert(now);
                attempt.updated_at = now;
                true
            }
            _ => false,
        }))
    }

    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        let mut overdue: Vec<(PrimitiveDateTime, String)> = self.with(|data| {
            data.attempts
                .values()
                .filter(|a| a.status == AttemptStatus::InProgress && a.deadline_at < now)
                .map(|a| (a.deadline_at, a.id.clone()))
                .collect()
        });
        overdue.sort();
        Ok(overdue.into_iter().take(limit.max(0) as usize).map(|(_, id)| id).collect())
    }

    async fn upsert_answer(
        &self,
        answer: AnswerInput,
        now: PrimitiveDateTime,
    ) -> Result<Answer, StoreError> {
        Ok(self.with(|data| {
            if let Some(existing) = data.answers.iter_mut().find(|existing| {
                existing.attempt_id == answer.attempt_id
                    && existing.question_id == answer.question_id
            }) {
                existing.answer_text = answer.answer_text;
                existing.selected_option_index = answer.selected_option_index;
                if !answer.audio_keys.is_empty() {
                    existing.audio_keys = Json(answer.audio_keys);
                }
                existing.updated_at = now;
                return existing.clone();
            }

            let created = Answer {
                id: answer.id,
                attempt_id: answer.attempt_id,
                exam_id: answer.exam_id,
                student_id: answer.student_id,
                question_id: answer.question_id,
                answer_text: answer.answer_text,
                selected_option_index: answer.selected_option_index,
                audio_keys: Json(answer.audio_keys),
                transcribed_text: None,
                stt_status: StageStatus::Pending,
                stt_error: None,
                stt_timestamp: None,
                score: None,
                max_marks: None,
                evaluation_feedback: None,
                evaluation_model: None,
                evaluation_status: StageStatus::Pending,
                evaluated_at: None,
                created_at: now,
                updated_at: now,
            };
            data.answers.push(created.clone());
            created
        }))
    }

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError> {
        Ok(self.with(|data| {
            data.answers.iter().filter(|answer| answer.attempt_id == attempt_id).cloned().collect()
        }))
    }

    async fn record_transcription(
        &self,
        answer_id: &str,
        update: &TranscriptionUpdate,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        self.with(|data| {
            if let Some(answer) = data.answers.iter_mut().find(|answer| answer.id == answer_id) {
                if update.transcribed_text.is_some() {
                    answer.transcribed_text = update.transcribed_text.clone();
                }
                answer.stt_status = update.stt_status;
                answer.stt_error = update.stt_error.clone();
                answer.stt_timestamp = update.stt_timestamp;
                answer.updated_at = now;
            }
        });
        Ok(())
    }

    async fn record_evaluation(
        &self,
        answer_id: &str,
        update: &EvaluationUpdate,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        self.with(|data| {
            if let Some(answer) = data.answers.iter_mut().find(|answer| answer.id == answer_id) {
                answer.score = update.score;
                answer.max_marks = update.max_marks;
                answer.evaluation_feedback = update.feedback.clone();
                answer.evaluation_model = update.model.clone();
                answer.evaluation_status = update.status;
                answer.evaluated_at = update.evaluated_at;
                answer.updated_at = now;
            }
        });
        Ok(())
    }
}

/// TTS fake that fails the first `failures` calls.
#[derive(Default)]
pub(crate) struct FakeSpeechSynthesizer {
    failures: AtomicU32,
    pub(crate) calls: AtomicUsize,
}

impl FakeSpeechSynthesizer {
    pub(crate) fn fail_next(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeechSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::Status { status: 503, body: "tts overloaded".to_string() });
        }
        Ok(format!("mp3:{}", request.text).into_bytes())
    }
}

/// STT fake that echoes the audio bytes as text.
#[derive(Default)]
pub(crate) struct FakeSpeechToText {
    failing: StdMutex<HashSet<String>>,
    pub(crate) calls: AtomicUsize,
}

impl FakeSpeechToText {
    pub(crate) fn fail_for(&self, file_name: &str) {
        self.failing.lock().expect("stt lock").insert(file_name.to_string());
    }
}

#[async_trait]
impl SpeechToText for FakeSpeechToText {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().expect("stt lock").contains(file_name) {
            return Err(ServiceError::Timeout);
        }
        Ok(String::from_utf8_lossy(&audio).into_owned())
    }
}

/// Evaluator fake returning a fixed score, or an error for scripted student answers.
pub(crate) struct FakeEvaluator {
    score: StdMutex<f64>,
    failing: StdMutex<HashMap<String, bool>>,
    pub(crate) calls: AtomicUsize,
}

impl Default for FakeEvaluator {
    fn default() -> Self {
        Self {
            score: StdMutex::new(5.0),
            failing: StdMutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeEvaluator {
    pub(crate) fn set_score(&self, score: f64) {
        *self.score.lock().expect("evaluator lock") = score;
    }

    /// `disabled` selects `ServiceError::Disabled` over a transport failure.
    pub(crate) fn fail_for(&self, student_answer: &str, disabled: bool) {
        self.failing.lock().expect("evaluator lock").insert(student_answer.to_string(), disabled);
    }
}

#[async_trait]
impl AnswerEvaluator for FakeEvaluator {
    async fn evaluate(&self, request: &EvaluationRequest<'_>) -> Result<Evaluation, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failing.lock().expect("evaluator lock").get(request.student_answer).copied();
        match failure {
            Some(true) => Err(ServiceError::Disabled("OPENAI_API_KEY")),
            Some(false) => Err(ServiceError::Transport("connection reset".to_string())),
            None => Ok(Evaluation {
                score: *self.score.lock().expect("evaluator lock"),
                feedback: "Reasonable answer.".to_string(),
                model: FAKE_MODEL.to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeRubricGenerator {
    pub(crate) calls: AtomicUsize,
}

#[async_trait]
impl RubricGenerator for FakeRubricGenerator {
    async fn generate_rubric(
        &self,
        _question_text: &str,
        _expected_answer: Option<&str>,
        marks: f64,
    ) -> Result<Value, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"criteria": [{"name": "accuracy", "marks": marks, "description": "correct"}]}))
    }
}

#[derive(Default)]
pub(crate) struct MemoryAudioStorage {
    objects: StdMutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAudioStorage {
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.objects.lock().expect("storage lock").contains_key(key)
    }
}

#[async_trait]
impl AudioStorage for MemoryAudioStorage {
    async fn put(
        &self,
        key: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, ServiceError> {
        let stored = StoredObject {
            key: key.to_string(),
            size: bytes.len() as i64,
            sha256: hex::encode(Sha256::digest(&bytes)),
        };
        self.objects.lock().expect("storage lock").insert(key.to_string(), bytes);
        Ok(stored)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ServiceError> {
        self.objects
            .lock()
            .expect("storage lock")
            .get(key)
            .cloned()
            .ok_or(ServiceError::Status { status: 404, body: format!("{key} not found") })
    }
}

/// App state wired to in-memory collaborators, with handles to every fake.
pub(crate) struct TestHarness {
    pub(crate) state: AppState,
    pub(crate) store: Arc<InMemoryStore>,
    pub(crate) queue: Arc<InMemoryJobQueue>,
    pub(crate) storage: Arc<MemoryAudioStorage>,
    pub(crate) tts: Arc<FakeSpeechSynthesizer>,
    pub(crate) stt: Arc<FakeSpeechToText>,
    pub(crate) evaluator: Arc<FakeEvaluator>,
    pub(crate) rubrics: Arc<FakeRubricGenerator>,
}

impl TestHarness {
    pub(crate) async fn new() -> Self {
        Self::with_settings(test_settings(&[]).await)
    }

    pub(crate) fn with_settings(settings: Settings) -> Self {
        let store = Arc::new(InMemoryStore::default());
        let queue = Arc::new(InMemoryJobQueue::new());
        let storage = Arc::new(MemoryAudioStorage::default());
        let state = AppState::new(settings, store.clone(), queue.clone(), storage.clone(), None);

        Self {
            state,
            store,
            queue,
            storage,
            tts: Arc::new(FakeSpeechSynthesizer::default()),
            stt: Arc::new(FakeSpeechToText::default()),
            evaluator: Arc::new(FakeEvaluator::default()),
            rubrics: Arc::new(FakeRubricGenerator::default()),
        }
    }

    pub(crate) fn services(&self) -> PipelineServices {
        PipelineServices {
            tts: self.tts.clone(),
            stt: self.stt.clone(),
            evaluator: self.evaluator.clone(),
            rubrics: self.rubrics.clone(),
        }
    }

    pub(crate) fn enrichment(&self) -> EnrichmentHandler {
        EnrichmentHandler::new(
            self.store.clone(),
            self.storage.clone(),
            self.tts.clone(),
            self.rubrics.clone(),
            self.state.settings().enrichment().clone(),
        )
    }

    /// Runs the evaluation stage for `attempt` directly, outside any worker pool.
    pub(crate) async fn evaluate(&self, attempt: &Attempt) {
        let job = AttemptJob {
            exam_id: attempt.exam_id.clone(),
            student_id: attempt.student_id.clone(),
            attempt_id: attempt.id.clone(),
        };
        EvaluationHandler::new(self.store.clone(), self.evaluator.clone())
            .evaluate_attempt(&job)
            .await
            .expect("evaluate attempt");
    }

    /// Runs enrichment for every question of the exam, then publishes it.
    pub(crate) async fn publish(&self, exam_id: &str, teacher_id: &str) {
        let enrichment = self.enrichment();
        for question in self.store.list_questions(exam_id).await.expect("list questions") {
            enrichment.process_question(&question.id).await.expect("enrich question");
        }
        let outcome = publishing::publish_exam(
            &self.state,
            exam_id,
            teacher_id,
            Vec::new(),
            primitive_now_utc(),
        )
        .await
        .expect("publish");
        assert!(matches!(outcome, PublishOutcome::Published { .. }), "publish gated: {outcome:?}");
    }
}

/// Draft exam owned by `teacher_id`: open window, 60 minutes, 10 points.
pub(crate) async fn seed_exam(state: &AppState, teacher_id: &str) -> Exam {
    publishing::create_exam(
        state,
        ExamDraft {
            teacher_id: teacher_id.to_string(),
            title: "Systems exam".to_string(),
            description: None,
            start_time: None,
            end_time: None,
            duration_minutes: Some(60),
            points_total: 10.0,
        },
        primitive_now_utc(),
    )
    .await
    .expect("seed exam")
}

/// Four-option MCQ worth 2 marks.
pub(crate) async fn seed_mcq(
    state: &AppState,
    exam_id: &str,
    teacher_id: &str,
    order_index: i32,
    correct_option_index: i32,
) -> Question {
    publishing::create_question(
        state,
        QuestionDraft {
            exam_id: exam_id.to_string(),
            teacher_id: teacher_id.to_string(),
            order_index,
            text: format!("Pick the right option #{order_index}"),
            question_type: QuestionType::Mcq,
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option_index: Some(correct_option_index),
            marks: 2.0,
            expected_answer: None,
            requires_audio: false,
        },
        primitive_now_utc(),
    )
    .await
    .expect("seed mcq")
}

pub(crate) async fn seed_open_question(
    state: &AppState,
    exam_id: &str,
    teacher_id: &str,
    order_index: i32,
    question_type: QuestionType,
    requires_audio: bool,
    marks: f64,
) -> Question {
    publishing::create_question(
        state,
        QuestionDraft {
            exam_id: exam_id.to_string(),
            teacher_id: teacher_id.to_string(),
            order_index,
            text: format!("Explain concept #{order_index}"),
            question_type,
            options: Vec::new(),
            correct_option_index: None,
            marks,
            expected_answer: Some("A thorough explanation".to_string()),
            requires_audio,
        },
        primitive_now_utc(),
    )
    .await
    .expect("seed open question")
}

pub(crate) fn text_answer(question_id: &str, text: &str) -> SubmittedAnswer {
    SubmittedAnswer {
        question_id: question_id.to_string(),
        answer_text: Some(text.to_string()),
        ..SubmittedAnswer::default()
    }
}

pub(crate) fn choice_answer(question_id: &str, selected: i32) -> SubmittedAnswer {
    SubmittedAnswer {
        question_id: question_id.to_string(),
        selected_option_index: Some(selected),
        ..SubmittedAnswer::default()
    }
}

/// Starts an attempt for `student_id`, uploads `recordings` and submits `answers`.
///
/// Each recording is attached to the matching answer as its only audio key.
pub(crate) async fn submit(
    state: &AppState,
    exam_id: &str,
    student_id: &str,
    recordings: &[(&str, &str)],
    mut answers: Vec<SubmittedAnswer>,
) -> Attempt {
    let now = primitive_now_utc();
    let attempt = attempts::start_attempt(state, exam_id, student_id, now).await.expect("start");
    for (question_id, spoken) in recordings {
        let stored = attempts::store_answer_audio(
            state,
            &attempt.id,
            student_id,
            question_id,
            spoken.as_bytes().to_vec(),
            now,
        )
        .await
        .expect("audio upload");
        match answers.iter_mut().find(|answer| answer.question_id == *question_id) {
            Some(answer) => answer.audio_keys = vec![stored.key],
            None => answers.push(SubmittedAnswer {
                question_id: question_id.to_string(),
                audio_keys: vec![stored.key],
                ..SubmittedAnswer::default()
            }),
        }
    }
    attempts::submit_attempt(state, &attempt.id, student_id, answers, now).await.expect("submit")
}
