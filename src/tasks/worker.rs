use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::tasks::queue::{FailOutcome, Job, JobQueue};

/// Processes one job type. An `Err` hands the job back to the queue's retry policy.
#[async_trait]
pub(crate) trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;

    async fn handle(&self, job: &Job) -> anyhow::Result<()>;
}

/// Fixed-size set of workers pulling from one named queue.
pub(crate) struct WorkerPool;

pub(crate) struct WorkerPoolHandle {
    queue_name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn start(
        queue: Arc<dyn JobQueue>,
        queue_name: &'static str,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let concurrency = concurrency.max(1);
        let handles = (0..concurrency)
            .map(|_| {
                tokio::spawn(worker_loop(
                    queue.clone(),
                    queue_name,
                    handler.clone(),
                    poll_interval,
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        tracing::info!(queue = queue_name, job_type = handler.job_type(), concurrency, "Worker pool started");
        WorkerPoolHandle { queue_name, shutdown_tx, handles }
    }
}

impl WorkerPoolHandle {
    /// Signals every worker and waits for in-flight jobs to finish.
    pub(crate) async fn stop(self) {
        if self.shutdown_tx.send(true).is_err() {
            tracing::warn!(queue = self.queue_name, "Worker pool already stopped");
        }
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!(queue = self.queue_name, error = %err, "Worker task join failed");
            }
        }
        tracing::info!(queue = self.queue_name, "Worker pool stopped");
    }
}

async fn worker_loop(
    queue: Arc<dyn JobQueue>,
    queue_name: &'static str,
    handler: Arc<dyn JobHandler>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match queue.claim(queue_name).await {
            Ok(Some(job)) => {
                run_job(queue.as_ref(), queue_name, handler.as_ref(), job).await;
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(queue = queue_name, error = %err, "Failed to claim job"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(poll_interval) => {}
        }
    }
}

pub(crate) async fn run_job(
    queue: &dyn JobQueue,
    queue_name: &'static str,
    handler: &dyn JobHandler,
    job: Job,
) {
    let started = Instant::now();
    let result = if job.name == handler.job_type() {
        handler.handle(&job).await
    } else {
        Err(anyhow::anyhow!("unknown job type {} on queue {queue_name}", job.name))
    };
    metrics::histogram!("job_duration_seconds", "queue" => queue_name)
        .record(started.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            metrics::counter!("jobs_total", "queue" => queue_name, "status" => "completed")
                .increment(1);
            if let Err(err) = queue.complete(&job).await {
                tracing::error!(queue = queue_name, job_id = %job.id, error = %err, "Failed to mark job completed");
            }
        }
        Err(err) => {
            let message = format!("{err:#}");
            match queue.fail(&job, &message).await {
                Ok(FailOutcome::Retrying { delay }) => {
                    metrics::counter!("jobs_total", "queue" => queue_name, "status" => "retrying")
                        .increment(1);
                    tracing::warn!(
                        queue = queue_name,
                        job_id = %job.id,
                        attempt = job.attempt(),
                        retry_in_ms = delay.as_millis() as u64,
                        error = %message,
                        "Job failed; retry scheduled"
                    );
                }
                Ok(FailOutcome::Exhausted) => {
                    metrics::counter!("jobs_total", "queue" => queue_name, "status" => "failed")
                        .increment(1);
                    tracing::error!(
                        queue = queue_name,
                        job_id = %job.id,
                        attempts = job.attempt(),
                        error = %message,
                        "Job failed permanently"
                    );
                }
                Err(queue_err) => {
                    tracing::error!(
                        queue = queue_name,
                        job_id = %job.id,
                        error = %queue_err,
                        "Failed to record job failure"
                    );
                }
            }
        }
    }
}
