use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use super::{FailOutcome, Job, JobOptions, JobQueue, QueueError};

/// Process-local queue on the tokio clock. Jobs do not survive a restart.
#[derive(Default)]
pub(crate) struct InMemoryJobQueue {
    queues: Mutex<HashMap<String, QueueState>>,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<String, Job>,
    delayed: Vec<Delayed>,
    active: HashMap<String, Instant>,
    failed: Vec<String>,
    sequence: u64,
}

struct Delayed {
    ready_at: Instant,
    sequence: u64,
    job_id: String,
}

impl QueueState {
    /// A job has at most one delayed entry; rescheduling replaces it.
    fn schedule(&mut self, job_id: String, ready_at: Instant) {
        self.delayed.retain(|entry| entry.job_id != job_id);
        self.sequence += 1;
        self.delayed.push(Delayed { ready_at, sequence: self.sequence, job_id });
    }
}

impl InMemoryJobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_queue<T>(
        &self,
        queue: &str,
        f: impl FnOnce(&mut QueueState) -> T,
    ) -> Result<T, QueueError> {
        let mut guard = self
            .queues
            .lock()
            .map_err(|_| QueueError::Unavailable("in-memory queue lock poisoned".to_string()))?;
        Ok(f(guard.entry(queue.to_string()).or_default()))
    }

    /// Jobs waiting for their delay to elapse, as (job name, remaining delay).
    #[cfg(test)]
    pub(crate) fn pending(&self, queue: &str) -> Vec<(Job, Duration)> {
        let now = Instant::now();
        self.with_queue(queue, |state| {
            let mut entries: Vec<_> = state
                .delayed
                .iter()
                .filter_map(|entry| {
                    state
                        .jobs
                        .get(&entry.job_id)
                        .map(|job| (entry.ready_at, entry.sequence, job.clone()))
                })
                .collect();
            entries.sort_by_key(|(ready_at, sequence, _)| (*ready_at, *sequence));
            entries
                .into_iter()
                .map(|(ready_at, _, job)| (job, ready_at.saturating_duration_since(now)))
                .collect()
        })
        .unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        payload: Value,
        options: JobOptions,
    ) -> Result<String, QueueError> {
        let ready_at = Instant::now() + options.delay();
        let job = Job::new(queue, name, payload, options);
        let id = job.id.clone();
        self.with_queue(queue, |state| {
            state.jobs.insert(id.clone(), job);
            state.schedule(id.clone(), ready_at);
        })?;
        Ok(id)
    }

    async fn claim(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        let now = Instant::now();
        self.with_queue(queue, |state| {
            let next = state
                .delayed
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.ready_at <= now)
                .min_by_key(|(_, entry)| (entry.ready_at, entry.sequence))
                .map(|(index, _)| index)?;
            let entry = state.delayed.swap_remove(next);
            let job = state.jobs.get(&entry.job_id)?.clone();
            state.active.insert(entry.job_id, now);
            Some(job)
        })
    }

    async fn complete(&self, job: &Job) -> Result<(), QueueError> {
        self.with_queue(&job.queue, |state| {
            state.active.remove(&job.id);
            if job.options.remove_on_complete {
                state.jobs.remove(&job.id);
            }
        })
    }

    async fn fail(&self, job: &Job, error: &str) -> Result<FailOutcome, QueueError> {
        let now = Instant::now();
        self.with_queue(&job.queue, |state| {
            state.active.remove(&job.id);
            let mut updated = state.jobs.get(&job.id).cloned().unwrap_or_else(|| job.clone());
            let outcome = updated.register_failure(error);
            match outcome {
                FailOutcome::Retrying { delay } => {
                    state.jobs.insert(updated.id.clone(), updated.clone());
                    state.schedule(updated.id, now + delay);
                }
                FailOutcome::Exhausted if updated.options.remove_on_fail => {
                    state.jobs.remove(&updated.id);
                }
                FailOutcome::Exhausted => {
                    state.failed.push(updated.id.clone());
                    state.jobs.insert(updated.id.clone(), updated);
                }
            }
            outcome
        })
    }

    async fn failed_jobs(&self, queue: &str) -> Result<Vec<Job>, QueueError> {
        self.with_queue(queue, |state| {
            state.failed.iter().filter_map(|id| state.jobs.get(id).cloned()).collect()
        })
    }

    async fn requeue_stalled(
        &self,
        queue: &str,
        stalled_after: Duration,
    ) -> Result<usize, QueueError> {
        let now = Instant::now();
        self.with_queue(queue, |state| {
            let stalled: Vec<String> = state
                .active
                .iter()
                .filter(|(_, claimed_at)| now.saturating_duration_since(**claimed_at) >= stalled_after)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &stalled {
                state.active.remove(id);
                state.schedule(id.clone(), now);
            }
            stalled.len()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::InMemoryJobQueue;
    use crate::tasks::queue::{FailOutcome, JobOptions, JobQueue};

    #[tokio::test(start_paused = true)]
    async fn delayed_job_is_invisible_until_due() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue("q", "work", json!({"n": 1}), JobOptions::new(10_000, 3, 1_000)).await.unwrap();

        assert!(queue.claim("q").await.unwrap().is_none());
        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(queue.claim("q").await.unwrap().is_none());
        tokio::time::advance(Duration::from_millis(1)).await;

        let job = queue.claim("q").await.unwrap().expect("job due");
        assert_eq!(job.name, "work");
        assert_eq!(job.attempt(), 1);
        assert!(queue.claim("q").await.unwrap().is_none(), "claimed job stays in flight");
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_are_claimed_in_delay_order() {
        let queue = InMemoryJobQueue::new();
        let late =
            queue.enqueue("q", "work", json!({}), JobOptions::new(60_000, 1, 0)).await.unwrap();
        let early =
            queue.enqueue("q", "work", json!({}), JobOptions::new(30_000, 1, 0)).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(queue.claim("q").await.unwrap().unwrap().id, early);
        assert_eq!(queue.claim("q").await.unwrap().unwrap().id, late);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_retries_with_backoff_then_lands_in_failed_set() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue("q", "work", json!({}), JobOptions::new(0, 2, 2_000)).await.unwrap();

        let job = queue.claim("q").await.unwrap().unwrap();
        let outcome = queue.fail(&job, "timeout").await.unwrap();
        assert_eq!(outcome, FailOutcome::Retrying { delay: Duration::from_secs(2) });

        tokio::time::advance(Duration::from_millis(1_999)).await;
        assert!(queue.claim("q").await.unwrap().is_none());
        tokio::time::advance(Duration::from_millis(1)).await;

        let retry = queue.claim("q").await.unwrap().unwrap();
        assert_eq!(retry.attempt(), 2);
        assert_eq!(queue.fail(&retry, "timeout again").await.unwrap(), FailOutcome::Exhausted);

        let failed = queue.failed_jobs("q").await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts_made, 2);
        assert_eq!(failed[0].last_error.as_deref(), Some("timeout again"));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_on_fail_discards_exhausted_job() {
        let queue = InMemoryJobQueue::new();
        let mut options = JobOptions::new(0, 1, 0);
        options.remove_on_fail = true;
        queue.enqueue("q", "work", json!({}), options).await.unwrap();

        let job = queue.claim("q").await.unwrap().unwrap();
        assert_eq!(queue.fail(&job, "boom").await.unwrap(), FailOutcome::Exhausted);
        assert!(queue.failed_jobs("q").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_job_is_returned_to_the_queue() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue("q", "work", json!({}), JobOptions::new(0, 3, 0)).await.unwrap();
        let job = queue.claim("q").await.unwrap().unwrap();

        assert_eq!(queue.requeue_stalled("q", Duration::from_secs(60)).await.unwrap(), 0);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(queue.requeue_stalled("q", Duration::from_secs(60)).await.unwrap(), 1);

        let again = queue.claim("q").await.unwrap().unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.attempt(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_after_stalled_requeue_keeps_a_single_entry() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue("q", "work", json!({}), JobOptions::new(0, 3, 1_000)).await.unwrap();
        let job = queue.claim("q").await.unwrap().unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(queue.requeue_stalled("q", Duration::from_secs(60)).await.unwrap(), 1);
        // The slow run finishes after the requeue and fails.
        let outcome = queue.fail(&job, "late failure").await.unwrap();
        assert_eq!(outcome, FailOutcome::Retrying { delay: Duration::from_secs(1) });
        assert_eq!(queue.pending("q").len(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        let retry = queue.claim("q").await.unwrap().expect("retry due");
        assert_eq!(retry.id, job.id);
        assert_eq!(retry.attempt(), 2);
        assert!(queue.claim("q").await.unwrap().is_none(), "job must not be claimable twice");
    }

    #[tokio::test(start_paused = true)]
    async fn queues_are_isolated_by_name() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue("a", "work", json!({}), JobOptions::new(0, 1, 0)).await.unwrap();

        assert!(queue.claim("b").await.unwrap().is_none());
        assert!(queue.claim("a").await.unwrap().is_some());
    }
}
