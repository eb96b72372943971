use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::config::EnrichmentSettings;
use crate::core::time::primitive_now_utc;
use crate::db::models::Question;
use crate::db::types::{AudioStatus, RubricStatus};
use crate::repositories::{AiStateUpdate, Store};
use crate::services::answer_evaluation::RubricGenerator;
use crate::services::errors::ServiceError;
use crate::services::speech_synthesis::{SpeechSynthesizer, SynthesisRequest};
use crate::services::storage::{question_audio_key, AudioStorage, StoredObject, AUDIO_CONTENT_TYPE};
use crate::tasks::queue::{Job, JobOptions, JobQueue, QueueError, ENRICHMENT_QUEUE};
use crate::tasks::worker::JobHandler;

pub(crate) const JOB_TYPE: &str = "process-question";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProcessQuestion {
    pub(crate) question_id: String,
}

/// Enqueues one job per question in document order, each delayed by `index * stagger`.
pub(crate) async fn enqueue_for_questions(
    queue: &dyn JobQueue,
    settings: &EnrichmentSettings,
    question_ids: &[String],
) -> Result<Vec<String>, QueueError> {
    let mut job_ids = Vec::with_capacity(question_ids.len());
    for (index, question_id) in question_ids.iter().enumerate() {
        let delay_ms = settings.stagger_ms.saturating_mul(index as u64);
        let options =
            JobOptions::new(delay_ms, settings.max_attempts, settings.backoff_base_ms);
        let payload = serde_json::to_value(ProcessQuestion { question_id: question_id.clone() })?;
        let job_id = queue.enqueue(ENRICHMENT_QUEUE, JOB_TYPE, payload, options).await?;
        tracing::debug!(question_id = %question_id, job_id = %job_id, delay_ms, "Enrichment job enqueued");
        job_ids.push(job_id);
    }
    Ok(job_ids)
}

pub(crate) struct EnrichmentHandler {
    store: Arc<dyn Store>,
    storage: Arc<dyn AudioStorage>,
    tts: Arc<dyn SpeechSynthesizer>,
    rubrics: Arc<dyn RubricGenerator>,
    settings: EnrichmentSettings,
}

impl EnrichmentHandler {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn AudioStorage>,
        tts: Arc<dyn SpeechSynthesizer>,
        rubrics: Arc<dyn RubricGenerator>,
        settings: EnrichmentSettings,
    ) -> Self {
        Self { store, storage, tts, rubrics, settings }
    }

    pub(crate) async fn process_question(&self, question_id: &str) -> Result<()> {
        let Some(question) = self
            .store
            .find_question(question_id)
            .await
            .with_context(|| format!("Failed to load question {question_id}"))?
        else {
            tracing::info!(question_id, "Question no longer exists; skipping enrichment");
            return Ok(());
        };

        let mut update = AiStateUpdate {
            ai: question.ai.clone(),
            tts_generated: question.tts_generated,
            tts_audio_key: question.tts_audio_key.clone(),
            rubric: question.rubric.as_ref().map(|rubric| rubric.0.clone()),
            is_ready_for_publish: question.is_ready_for_publish,
        };
        let mut failure: Option<anyhow::Error> = None;

        if question.requires_audio && update.ai.audio_status != AudioStatus::Done {
            match self.synthesize_audio(&question).await {
                Ok(stored) => {
                    metrics::counter!("enrichment_audio_total", "status" => "done").increment(1);
                    tracing::info!(question_id, key = %stored.key, sha256 = %stored.sha256, "Question audio stored");
                    update.ai.audio_status = AudioStatus::Done;
                    update.ai.audio_error = None;
                    update.tts_generated = true;
                    update.tts_audio_key = Some(stored.key);
                }
                Err(err) => {
                    metrics::counter!("enrichment_audio_total", "status" => "failed").increment(1);
                    tracing::warn!(question_id, error = %err, "Question audio synthesis failed");
                    update.ai.audio_status = AudioStatus::Failed;
                    update.ai.audio_retry_count += 1;
                    update.ai.audio_error = Some(err.to_string());
                    failure = Some(anyhow::Error::new(err).context("Audio synthesis failed"));
                }
            }
        }

        if !self.settings.rubric_enabled || question.question_type.is_mcq() {
            update.ai.rubric_status = RubricStatus::Skipped;
        } else if update.ai.rubric_status != RubricStatus::Done {
            match self
                .rubrics
                .generate_rubric(&question.text, question.expected_answer.as_deref(), question.marks)
                .await
            {
                Ok(rubric) => {
                    metrics::counter!("enrichment_rubric_total", "status" => "done").increment(1);
                    update.ai.rubric_status = RubricStatus::Done;
                    update.ai.rubric_error = None;
                    update.rubric = Some(rubric);
                }
                Err(err) => {
                    metrics::counter!("enrichment_rubric_total", "status" => "failed").increment(1);
                    tracing::warn!(question_id, error = %err, "Rubric generation failed");
                    update.ai.rubric_status = RubricStatus::Failed;
                    update.ai.rubric_retry_count += 1;
                    update.ai.rubric_error = Some(err.to_string());
                    if failure.is_none() {
                        failure = Some(anyhow::Error::new(err).context("Rubric generation failed"));
                    }
                }
            }
        }

        update.is_ready_for_publish = update.ai.is_ready(question.question_type, question.requires_audio);
        self.store
            .update_question_ai(question_id, &update, primitive_now_utc())
            .await
            .with_context(|| format!("Failed to persist AI state of question {question_id}"))?;

        tracing::info!(
            question_id,
            audio = ?update.ai.audio_status,
            rubric = ?update.ai.rubric_status,
            ready = update.is_ready_for_publish,
            "Question enrichment processed"
        );

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn synthesize_audio(&self, question: &Question) -> Result<StoredObject, ServiceError> {
        let request = SynthesisRequest {
            question_id: &question.id,
            text: &question.text,
            language: &self.settings.tts_language,
            slow: false,
        };
        let audio = self.tts.synthesize(&request).await?;
        self.storage.put(&question_audio_key(&question.id), AUDIO_CONTENT_TYPE, audio).await
    }
}

#[async_trait]
impl JobHandler for EnrichmentHandler {
    fn job_type(&self) -> &'static str {
        JOB_TYPE
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let payload: ProcessQuestion = job.data().context("Invalid process-question payload")?;
        tracing::info!(
            queue = ENRICHMENT_QUEUE,
            job_id = %job.id,
            attempt = job.attempt(),
            question_id = %payload.question_id,
            "Processing question enrichment"
        );
        self.process_question(&payload.question_id).await
    }
}
