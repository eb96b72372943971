use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::Script;
use async_trait::async_trait;
use serde_json::Value;

use super::{FailOutcome, Job, JobOptions, JobQueue, QueueError};
use crate::core::redis::RedisHandle;

/// Moves the earliest due job from the delayed set to the active set and returns its body.
const CLAIM_SCRIPT: &str = r"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #ids == 0 then
  return false
end
local id = ids[1]
redis.call('ZREM', KEYS[1], id)
local body = redis.call('HGET', KEYS[3], id)
if not body then
  return false
end
redis.call('ZADD', KEYS[2], ARGV[1], id)
return body
";

/// Returns jobs claimed before ARGV[1] to the delayed set, due at ARGV[2].
const REQUEUE_STALLED_SCRIPT: &str = r"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  redis.call('ZADD', KEYS[2], ARGV[2], id)
end
return #ids
";

/// Queue state in Redis: a hash of job bodies plus delayed/active/failed sorted sets scored
/// by epoch milliseconds.
pub(crate) struct RedisJobQueue {
    redis: RedisHandle,
    prefix: String,
    claim: Script,
    requeue: Script,
}

struct Keys {
    jobs: String,
    delayed: String,
    active: String,
    failed: String,
}

impl RedisJobQueue {
    pub(crate) fn new(redis: RedisHandle, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            claim: Script::new(CLAIM_SCRIPT),
            requeue: Script::new(REQUEUE_STALLED_SCRIPT),
        }
    }

    fn keys(&self, queue: &str) -> Keys {
        let base = format!("{}:{queue}", self.prefix);
        Keys {
            jobs: format!("{base}:jobs"),
            delayed: format!("{base}:delayed"),
            active: format!("{base}:active"),
            failed: format!("{base}:failed"),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, QueueError> {
        self.redis
            .connection()
            .await
            .ok_or_else(|| QueueError::Unavailable("redis is not connected".to_string()))
    }
}

fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        payload: Value,
        options: JobOptions,
    ) -> Result<String, QueueError> {
        let ready_at = now_ms().saturating_add(millis(options.delay()));
        let job = Job::new(queue, name, payload, options);
        let body = serde_json::to_string(&job)?;
        let keys = self.keys(queue);
        let mut conn = self.connection().await?;

        let _: () = ::redis::pipe()
            .atomic()
            .hset(&keys.jobs, &job.id, body)
            .ignore()
            .zadd(&keys.delayed, &job.id, ready_at)
            .ignore()
            .query_async(&mut conn)
            .await?;

        tracing::debug!(queue, job_id = %job.id, job_type = name, ready_at, "Job enqueued");
        Ok(job.id)
    }

    async fn claim(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        let keys = self.keys(queue);
        let mut conn = self.connection().await?;
        let body: Option<String> = self
            .claim
            .key(&keys.delayed)
            .key(&keys.active)
            .key(&keys.jobs)
            .arg(now_ms())
            .invoke_async(&mut conn)
            .await?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn complete(&self, job: &Job) -> Result<(), QueueError> {
        let keys = self.keys(&job.queue);
        let mut conn = self.connection().await?;
        let mut pipe = ::redis::pipe();
        pipe.atomic().zrem(&keys.active, &job.id).ignore();
        if job.options.remove_on_complete {
            pipe.hdel(&keys.jobs, &job.id).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str) -> Result<FailOutcome, QueueError> {
        let keys = self.keys(&job.queue);
        let mut conn = self.connection().await?;
        let mut updated = job.clone();
        let outcome = updated.register_failure(error);
        let now = now_ms();

        let mut pipe = ::redis::pipe();
        pipe.atomic().zrem(&keys.active, &updated.id).ignore();
        match outcome {
            FailOutcome::Retrying { delay } => {
                pipe.hset(&keys.jobs, &updated.id, serde_json::to_string(&updated)?)
                    .ignore()
                    .zadd(&keys.delayed, &updated.id, now.saturating_add(millis(delay)))
                    .ignore();
            }
            FailOutcome::Exhausted if updated.options.remove_on_fail => {
                pipe.hdel(&keys.jobs, &updated.id).ignore();
            }
            FailOutcome::Exhausted => {
                pipe.hset(&keys.jobs, &updated.id, serde_json::to_string(&updated)?)
                    .ignore()
                    .zadd(&keys.failed, &updated.id, now)
                    .ignore();
            }
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(outcome)
    }

    async fn failed_jobs(&self, queue: &str) -> Result<Vec<Job>, QueueError> {
        let keys = self.keys(queue);
        let mut conn = self.connection().await?;
        let ids: Vec<String> = ::redis::cmd("ZRANGE")
            .arg(&keys.failed)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let bodies: Vec<Option<String>> =
            ::redis::cmd("HMGET").arg(&keys.jobs).arg(&ids).query_async(&mut conn).await?;
        bodies
            .into_iter()
            .flatten()
            .map(|body| serde_json::from_str(&body).map_err(QueueError::from))
            .collect()
    }

    async fn requeue_stalled(
        &self,
        queue: &str,
        stalled_after: Duration,
    ) -> Result<usize, QueueError> {
        let keys = self.keys(queue);
        let mut conn = self.connection().await?;
        let now = now_ms();
        let moved: usize = self
            .requeue
            .key(&keys.active)
            .key(&keys.delayed)
            .arg(now.saturating_sub(millis(stalled_after)))
            .arg(now)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }
}
