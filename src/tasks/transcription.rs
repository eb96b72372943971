use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::core::config::SubmissionSettings;
use crate::core::time::primitive_now_utc;
use crate::db::models::Answer;
use crate::db::types::{AttemptStatus, StageStatus};
use crate::repositories::{Store, TranscriptionUpdate};
use crate::services::errors::ServiceError;
use crate::services::speech_to_text::SpeechToText;
use crate::services::storage::AudioStorage;
use crate::tasks::evaluation;
use crate::tasks::queue::{Job, JobOptions, JobQueue, QueueError, TRANSCRIPTION_QUEUE};
use crate::tasks::worker::JobHandler;
use crate::tasks::AttemptJob;

pub(crate) const JOB_TYPE: &str = "transcribe-answers";

pub(crate) async fn enqueue(
    queue: &dyn JobQueue,
    settings: &SubmissionSettings,
    job: &AttemptJob,
) -> Result<String, QueueError> {
    let options = JobOptions::new(
        settings.transcription_delay_ms,
        settings.max_attempts,
        settings.backoff_base_ms,
    );
    queue.enqueue(TRANSCRIPTION_QUEUE, JOB_TYPE, serde_json::to_value(job)?, options).await
}

pub(crate) struct TranscriptionHandler {
    store: Arc<dyn Store>,
    storage: Arc<dyn AudioStorage>,
    stt: Arc<dyn SpeechToText>,
    queue: Arc<dyn JobQueue>,
    settings: SubmissionSettings,
}

impl TranscriptionHandler {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn AudioStorage>,
        stt: Arc<dyn SpeechToText>,
        queue: Arc<dyn JobQueue>,
        settings: SubmissionSettings,
    ) -> Self {
        Self { store, storage, stt, queue, settings }
    }

    pub(crate) async fn transcribe_attempt(&self, payload: &AttemptJob) -> Result<()> {
        let attempt_id = payload.attempt_id.as_str();
        let attempt = self
            .store
            .find_attempt(attempt_id)
            .await
            .with_context(|| format!("Failed to load attempt {attempt_id}"))?
            .with_context(|| format!("Attempt {attempt_id} not found"))?;

        let answers = self
            .store
            .list_answers(&attempt.id)
            .await
            .with_context(|| format!("Failed to load answers of attempt {attempt_id}"))?;
        if answers.is_empty() {
            tracing::info!(attempt_id, "No answers to transcribe");
        }

        for answer in &answers {
            self.transcribe_answer(answer).await?;
        }

        let advanced = self
            .store
            .advance_attempt(&attempt.id, AttemptStatus::Transcribed, primitive_now_utc())
            .await
            .context("Failed to mark attempt transcribed")?;
        if !advanced {
            tracing::info!(attempt_id, status = ?attempt.status, "Attempt already past transcription");
        }

        match evaluation::enqueue(self.queue.as_ref(), &self.settings, payload).await {
            Ok(job_id) => tracing::info!(attempt_id, job_id = %job_id, "Evaluation job enqueued"),
            Err(err) => {
                tracing::error!(attempt_id, error = %err, "Failed to enqueue evaluation job")
            }
        }

        Ok(())
    }

    async fn transcribe_answer(&self, answer: &Answer) -> Result<()> {
        if answer.stt_status == StageStatus::Completed {
            tracing::debug!(answer_id = %answer.id, "Answer already transcribed");
            return Ok(());
        }

        let now = primitive_now_utc();
        let update = if !answer.has_audio() {
            metrics::counter!("answers_transcribed_total", "status" => "skipped").increment(1);
            TranscriptionUpdate {
                transcribed_text: None,
                stt_status: StageStatus::Skipped,
                stt_error: None,
                stt_timestamp: None,
            }
        } else {
            match self.transcribe_audio(answer).await {
                Ok(text) => {
                    metrics::counter!("answers_transcribed_total", "status" => "completed")
                        .increment(1);
                    TranscriptionUpdate {
                        transcribed_text: Some(text),
                        stt_status: StageStatus::Completed,
                        stt_error: None,
                        stt_timestamp: Some(now),
                    }
                }
                Err(err) => {
                    metrics::counter!("answers_transcribed_total", "status" => "failed")
                        .increment(1);
                    tracing::warn!(
                        answer_id = %answer.id,
                        question_id = %answer.question_id,
                        error = %err,
                        "Answer transcription failed"
                    );
                    TranscriptionUpdate {
                        transcribed_text: None,
                        stt_status: StageStatus::Failed,
                        stt_error: Some(err.to_string()),
                        stt_timestamp: Some(now),
                    }
                }
            }
        };

        self.store
            .record_transcription(&answer.id, &update, now)
            .await
            .with_context(|| format!("Failed to store transcription of answer {}", answer.id))
    }

    async fn transcribe_audio(&self, answer: &Answer) -> Result<String, ServiceError> {
        let mut parts = Vec::with_capacity(answer.audio_keys.0.len());
        for key in &answer.audio_keys.0 {
            let audio = self.storage.get(key).await?;
            let file_name = key.rsplit('/').next().unwrap_or("audio.mp3");
            parts.push(self.stt.transcribe(audio, file_name).await?);
        }
        Ok(parts.join(" "))
    }
}

#[async_trait]
impl JobHandler for TranscriptionHandler {
    fn job_type(&self) -> &'static str {
        JOB_TYPE
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let payload: AttemptJob = job.data().context("Invalid transcribe-answers payload")?;
        tracing::info!(
            queue = TRANSCRIPTION_QUEUE,
            job_id = %job.id,
            attempt = job.attempt(),
            attempt_id = %payload.attempt_id,
            "Transcribing attempt answers"
        );
        self.transcribe_attempt(&payload).await
    }
}
