mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub(crate) use self::memory::InMemoryJobQueue;
pub(crate) use self::redis::RedisJobQueue;

pub(crate) const ENRICHMENT_QUEUE: &str = "ai-processing";
pub(crate) const TRANSCRIPTION_QUEUE: &str = "answers-transcription";
pub(crate) const EVALUATION_QUEUE: &str = "answers-evaluation";

#[derive(Debug, Error)]
pub(crate) enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("job serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum Backoff {
    Exponential { base_delay_ms: u64 },
}

impl Backoff {
    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub(crate) fn delay_for(self, attempt: u32) -> Duration {
        match self {
            Self::Exponential { base_delay_ms } => {
                let exponent = attempt.saturating_sub(1).min(32);
                Duration::from_millis(base_delay_ms.saturating_mul(1u64 << exponent))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct JobOptions {
    pub(crate) delay_ms: u64,
    pub(crate) max_attempts: u32,
    pub(crate) backoff: Backoff,
    pub(crate) remove_on_complete: bool,
    pub(crate) remove_on_fail: bool,
}

impl JobOptions {
    pub(crate) fn new(delay_ms: u64, max_attempts: u32, backoff_base_ms: u64) -> Self {
        Self {
            delay_ms,
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential { base_delay_ms: backoff_base_ms },
            remove_on_complete: true,
            remove_on_fail: false,
        }
    }

    pub(crate) fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Job {
    pub(crate) id: String,
    pub(crate) queue: String,
    pub(crate) name: String,
    pub(crate) payload: Value,
    pub(crate) options: JobOptions,
    /// Failed attempts so far.
    #[serde(default)]
    pub(crate) attempts_made: u32,
    #[serde(default)]
    pub(crate) last_error: Option<String>,
}

impl Job {
    pub(crate) fn new(queue: &str, name: &str, payload: Value, options: JobOptions) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue: queue.to_string(),
            name: name.to_string(),
            payload,
            options,
            attempts_made: 0,
            last_error: None,
        }
    }

    /// 1-based number of the attempt currently running.
    pub(crate) fn attempt(&self) -> u32 {
        self.attempts_made + 1
    }

    pub(crate) fn data<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Records a failed attempt and decides whether the job goes back to the delayed set.
    fn register_failure(&mut self, error: &str) -> FailOutcome {
        self.attempts_made += 1;
        self.last_error = Some(error.to_string());
        if self.attempts_made < self.options.max_attempts {
            FailOutcome::Retrying { delay: self.options.backoff.delay_for(self.attempts_made) }
        } else {
            FailOutcome::Exhausted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailOutcome {
    Retrying { delay: Duration },
    Exhausted,
}

/// Named durable work queues with delayed visibility and retry with backoff.
///
/// A claimed job stays invisible to other workers until it is completed, failed, or
/// returned by [`JobQueue::requeue_stalled`]. Delivery is at-least-once.
#[async_trait]
pub(crate) trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        payload: Value,
        options: JobOptions,
    ) -> Result<String, QueueError>;

    async fn claim(&self, queue: &str) -> Result<Option<Job>, QueueError>;

    async fn complete(&self, job: &Job) -> Result<(), QueueError>;

    async fn fail(&self, job: &Job, error: &str) -> Result<FailOutcome, QueueError>;

    async fn failed_jobs(&self, queue: &str) -> Result<Vec<Job>, QueueError>;

    async fn requeue_stalled(
        &self,
        queue: &str,
        stalled_after: Duration,
    ) -> Result<usize, QueueError>;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Backoff, FailOutcome, Job, JobOptions};

    #[test]
    fn exponential_backoff_doubles_per_attempt() {
        let backoff = Backoff::Exponential { base_delay_ms: 20_000 };

        assert_eq!(backoff.delay_for(1), Duration::from_secs(20));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(40));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(80));
    }

    #[test]
    fn failures_retry_until_max_attempts() {
        let mut job = Job::new("q", "t", serde_json::json!({}), JobOptions::new(0, 3, 2_000));

        assert_eq!(
            job.register_failure("boom"),
            FailOutcome::Retrying { delay: Duration::from_secs(2) }
        );
        assert_eq!(
            job.register_failure("boom"),
            FailOutcome::Retrying { delay: Duration::from_secs(4) }
        );
        assert_eq!(job.register_failure("boom"), FailOutcome::Exhausted);
        assert_eq!(job.attempts_made, 3);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn options_serialize_with_tagged_backoff() {
        let options = JobOptions::new(30_000, 3, 20_000);
        let value = serde_json::to_value(&options).unwrap();

        assert_eq!(value["backoff"]["type"], "exponential");
        assert_eq!(value["backoff"]["base_delay_ms"], 20_000);
        assert_eq!(value["remove_on_fail"], false);
    }
}
