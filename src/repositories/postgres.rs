use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{Answer, Attempt, Exam, Question};
use crate::db::types::AttemptStatus;
use crate::repositories::{
    answers, attempts, exams, questions, AiStateUpdate, AnswerInput, EvaluationUpdate, NewAttempt,
    NewExam, NewQuestion, QuestionContent, Store, StoreError, TranscriptionUpdate,
};

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_exam(&self, exam: NewExam) -> Result<Exam, StoreError> {
        Ok(exams::create(&self.pool, exam).await?)
    }

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(exams::find_by_id(&self.pool, exam_id).await?)
    }

    async fn publish_exam(&self, exam_id: &str, now: PrimitiveDateTime) -> Result<bool, StoreError> {
        Ok(exams::publish(&self.pool, exam_id, now).await?)
    }

    async fn archive_exam(&self, exam_id: &str, now: PrimitiveDateTime) -> Result<bool, StoreError> {
        Ok(exams::archive(&self.pool, exam_id, now).await?)
    }

    async fn create_question(&self, question: NewQuestion) -> Result<Question, StoreError> {
        Ok(questions::create(&self.pool, question).await?)
    }

    async fn find_question(&self, question_id: &str) -> Result<Option<Question>, StoreError> {
        Ok(questions::find_by_id(&self.pool, question_id).await?)
    }

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, StoreError> {
        Ok(questions::list_by_exam(&self.pool, exam_id).await?)
    }

    async fn update_question_content(
        &self,
        content: &QuestionContent,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(questions::update_content(&self.pool, content, now).await?)
    }

    async fn update_question_ai(
        &self,
        question_id: &str,
        update: &AiStateUpdate,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        Ok(questions::update_ai_state(&self.pool, question_id, update, now).await?)
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> Result<bool, StoreError> {
        Ok(attempts::create(&self.pool, attempt).await?)
    }

    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::find_by_id(&self.pool, attempt_id).await?)
    }

    async fn find_attempt_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::find_for_student(&self.pool, exam_id, student_id).await?)
    }

    async fn list_attempts(&self, exam_id: &str) -> Result<Vec<Attempt>, StoreError> {
        Ok(attempts::list_by_exam(&self.pool, exam_id).await?)
    }

    async fn advance_attempt(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(attempts::advance(&self.pool, attempt_id, status, now).await?)
    }

    async fn mark_attempt_submitted(
        &self,
        attempt_id: &str,
        finished_at: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(attempts::mark_submitted(&self.pool, attempt_id, finished_at).await?)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        total_score: f64,
        max_score: f64,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(attempts::finalize(&self.pool, attempt_id, total_score, max_score, now).await?)
    }

    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        Ok(attempts::list_overdue(&self.pool, now, limit).await?)
    }

    async fn upsert_answer(
        &self,
        answer: AnswerInput,
        now: PrimitiveDateTime,
    ) -> Result<Answer, StoreError> {
        Ok(answers::upsert(&self.pool, answer, now).await?)
    }

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError> {
        Ok(answers::list_by_attempt(&self.pool, attempt_id).await?)
    }

    async fn record_transcription(
        &self,
        answer_id: &str,
        update: &TranscriptionUpdate,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        Ok(answers::record_transcription(&self.pool, answer_id, update, now).await?)
    }

    async fn record_evaluation(
        &self,
        answer_id: &str,
        update: &EvaluationUpdate,
        now: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        Ok(answers::record_evaluation(&self.pool, answer_id, update, now).await?)
    }
}
