//! Redis-backed queue.
//!
//! Layout under the configured prefix:
//! - `{prefix}:due`: sorted set, member = job id, score = not-before in epoch ms
//! - `{prefix}:job:{id}`: JSON-encoded [`Job`]
//!
//! `upsert` and `remove` run as MULTI/EXEC pipelines. Claiming and requeueing
//! need a read before the write, so they run server-side as Lua scripts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};

use chexmix_common::types::{Job, JobId};

use super::{DelayedQueue, QueueError};

/// Pops the earliest member with score <= ARGV[1] and returns `{id, job}`.
/// Index members whose job key is missing are dropped and skipped.
const CLAIM_SCRIPT: &str = r#"
while true do
  local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
  if #ids == 0 then
    return false
  end
  local id = ids[1]
  redis.call('ZREM', KEYS[1], id)
  local job_key = ARGV[2] .. id
  local job = redis.call('GET', job_key)
  if job then
    redis.call('DEL', job_key)
    return {id, job}
  end
end
"#;

/// Inserts the job only when its key is absent. Returns 1 if inserted.
const REQUEUE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 1 then
  return 0
end
redis.call('SET', KEYS[2], ARGV[1])
redis.call('ZADD', KEYS[1], ARGV[2], ARGV[3])
return 1
"#;

/// [`DelayedQueue`] stored in Redis, safe to share between processes.
pub struct RedisQueue {
    redis: ConnectionManager,
    prefix: String,
    claim_script: Script,
    requeue_script: Script,
}

impl RedisQueue {
    pub fn new(redis: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            claim_script: Script::new(CLAIM_SCRIPT),
            requeue_script: Script::new(REQUEUE_SCRIPT),
        }
    }

    fn due_key(&self) -> String {
        format!("{}:due", self.prefix)
    }

    fn job_key_prefix(&self) -> String {
        format!("{}:job:", self.prefix)
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}{}", self.job_key_prefix(), id)
    }

    fn encode(job: &Job) -> Result<String, QueueError> {
        serde_json::to_string(job).map_err(|e| QueueError::Corrupt {
            id: job.id.to_string(),
            reason: e.to_string(),
        })
    }

    fn decode(id: &str, raw: &str) -> Result<Job, QueueError> {
        serde_json::from_str(raw).map_err(|e| QueueError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}

fn unavailable(err: RedisError) -> QueueError {
    QueueError::Unavailable(err.to_string())
}

#[async_trait]
impl DelayedQueue for RedisQueue {
    async fn upsert(&self, job: Job) -> Result<(), QueueError> {
        let payload = Self::encode(&job)?;
        let mut conn = self.redis.clone();

        let _: () = redis::pipe()
            .atomic()
            .set(self.job_key(&job.id), payload)
            .ignore()
            .zadd(self.due_key(), job.id.as_str(), job.not_before.timestamp_millis())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(())
    }

    async fn requeue(&self, job: Job) -> Result<bool, QueueError> {
        let payload = Self::encode(&job)?;
        let mut conn = self.redis.clone();

        let inserted: i64 = self
            .requeue_script
            .key(self.due_key())
            .key(self.job_key(&job.id))
            .arg(payload)
            .arg(job.not_before.timestamp_millis())
            .arg(job.id.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(inserted == 1)
    }

    async fn remove(&self, id: &JobId) -> Result<bool, QueueError> {
        let mut conn = self.redis.clone();

        let (deleted, _unindexed): (i64, i64) = redis::pipe()
            .atomic()
            .del(self.job_key(id))
            .zrem(self.due_key(), id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(deleted > 0)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        let mut conn = self.redis.clone();

        let claimed: Option<(String, String)> = self
            .claim_script
            .key(self.due_key())
            .arg(now.timestamp_millis())
            .arg(self.job_key_prefix())
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        match claimed {
            Some((id, raw)) => Self::decode(&id, &raw).map(Some),
            None => Ok(None),
        }
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(self.job_key(id)).await.map_err(unavailable)?;
        raw.map(|raw| Self::decode(id.as_str(), &raw)).transpose()
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        conn.zcard(self.due_key()).await.map_err(unavailable)
    }
}
