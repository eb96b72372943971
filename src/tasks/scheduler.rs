use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::services::answer_evaluation::{AnswerEvaluator, OpenAiEvaluator, RubricGenerator};
use crate::services::attempts;
use crate::services::speech_synthesis::{HttpSpeechSynthesizer, SpeechSynthesizer};
use crate::services::speech_to_text::{HttpSpeechToText, SpeechToText};
use crate::tasks::enrichment::EnrichmentHandler;
use crate::tasks::evaluation::EvaluationHandler;
use crate::tasks::queue::{ENRICHMENT_QUEUE, EVALUATION_QUEUE, TRANSCRIPTION_QUEUE};
use crate::tasks::transcription::TranscriptionHandler;
use crate::tasks::worker::{WorkerPool, WorkerPoolHandle};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);
const EXPIRY_BATCH: i64 = 500;

/// External collaborators used by the job handlers.
#[derive(Clone)]
pub(crate) struct PipelineServices {
    pub(crate) tts: Arc<dyn SpeechSynthesizer>,
    pub(crate) stt: Arc<dyn SpeechToText>,
    pub(crate) evaluator: Arc<dyn AnswerEvaluator>,
    pub(crate) rubrics: Arc<dyn RubricGenerator>,
}

impl PipelineServices {
    pub(crate) fn from_settings(state: &AppState) -> Result<Self> {
        let ai = Arc::new(OpenAiEvaluator::from_settings(state.settings())?);
        Ok(Self {
            tts: Arc::new(HttpSpeechSynthesizer::from_settings(state.settings())?),
            stt: Arc::new(HttpSpeechToText::from_settings(state.settings())?),
            evaluator: ai.clone(),
            rubrics: ai,
        })
    }
}

/// Running worker pools plus the background maintenance loops.
pub(crate) struct WorkerRuntime {
    pools: Vec<WorkerPoolHandle>,
    shutdown_tx: watch::Sender<bool>,
    loops: Vec<JoinHandle<()>>,
}

impl WorkerRuntime {
    pub(crate) fn start(state: &AppState, services: PipelineServices) -> Self {
        let settings = state.settings();
        let poll = Duration::from_millis(settings.queue().poll_interval_ms);

        let enrichment = Arc::new(EnrichmentHandler::new(
            state.store().clone(),
            state.storage().clone(),
            services.tts,
            services.rubrics,
            settings.enrichment().clone(),
        ));
        let transcription = Arc::new(TranscriptionHandler::new(
            state.store().clone(),
            state.storage().clone(),
            services.stt,
            state.queue().clone(),
            settings.submission().clone(),
        ));
        let evaluation =
            Arc::new(EvaluationHandler::new(state.store().clone(), services.evaluator));

        let pools = vec![
            WorkerPool::start(
                state.queue().clone(),
                ENRICHMENT_QUEUE,
                enrichment,
                settings.queue().enrichment_concurrency,
                poll,
            ),
            WorkerPool::start(
                state.queue().clone(),
                TRANSCRIPTION_QUEUE,
                transcription,
                settings.queue().transcription_concurrency,
                poll,
            ),
            WorkerPool::start(
                state.queue().clone(),
                EVALUATION_QUEUE,
                evaluation,
                settings.queue().evaluation_concurrency,
                poll,
            ),
        ];

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut loops = vec![tokio::spawn(requeue_stalled_loop(state.clone(), shutdown_rx.clone()))];
        if settings.submission().expiry_sweep_seconds > 0 {
            loops.push(tokio::spawn(expire_attempts_loop(state.clone(), shutdown_rx)));
        }

        Self { pools, shutdown_tx, loops }
    }

    pub(crate) async fn stop(self) {
        if self.shutdown_tx.send(true).is_err() {
            tracing::warn!("Failed to broadcast shutdown signal to background tasks");
        }
        for pool in self.pools {
            pool.stop().await;
        }
        for handle in self.loops {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "Background task join failed");
            }
        }
    }
}

pub(crate) async fn run(state: AppState) -> Result<()> {
    let services = PipelineServices::from_settings(&state)?;
    let runtime = WorkerRuntime::start(&state, services);

    crate::core::shutdown::shutdown_signal().await;
    runtime.stop().await;

    Ok(())
}

async fn requeue_stalled_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let stalled_after = Duration::from_secs(state.settings().queue().stalled_after_seconds);
    let mut tick = interval(MAINTENANCE_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                for queue_name in [ENRICHMENT_QUEUE, TRANSCRIPTION_QUEUE, EVALUATION_QUEUE] {
                    match state.queue().requeue_stalled(queue_name, stalled_after).await {
                        Ok(0) => {}
                        Ok(moved) => {
                            metrics::counter!("stalled_jobs_requeued_total", "queue" => queue_name)
                                .increment(moved as u64);
                            tracing::warn!(queue = queue_name, moved, "Requeued stalled jobs");
                        }
                        Err(err) => {
                            tracing::error!(queue = queue_name, error = %err, "requeue_stalled failed");
                        }
                    }
                }
            }
        }
    }
}

async fn expire_attempts_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick =
        interval(Duration::from_secs(state.settings().submission().expiry_sweep_seconds));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = attempts::expire_overdue(&state, primitive_now_utc(), EXPIRY_BATCH).await {
                    tracing::error!(error = %err, "expire_overdue failed");
                }
            }
        }
    }
}
