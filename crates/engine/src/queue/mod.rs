//! Durable delayed queue.
//!
//! Holds at most one job per [`JobId`], each with a not-before time. The
//! contract every backend must honour:
//!
//! - `upsert` inserts or atomically replaces by id; the replaced job's timing
//!   and payload are gone, nothing can fire with stale data afterwards.
//! - `claim_due` removes and returns one due job in a single atomic step, so
//!   two workers polling the same queue never receive the same job.
//! - `requeue` only inserts when no job with that id is pending, so a retry
//!   never clobbers a newer schedule for the same recipient.

mod memory;
mod redis_backend;

pub use self::memory::MemoryQueue;
pub use self::redis_backend::RedisQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use chexmix_common::types::{Job, JobId};

/// Errors raised by a queue backend.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backend could not be reached.
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),

    /// A stored job could not be decoded.
    #[error("stored job {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
}

#[async_trait]
pub trait DelayedQueue: Send + Sync {
    /// Insert `job`, replacing any pending job with the same id.
    async fn upsert(&self, job: Job) -> Result<(), QueueError>;

    /// Insert `job` only if no job with its id is pending. Returns whether it was inserted.
    async fn requeue(&self, job: Job) -> Result<bool, QueueError>;

    /// Delete the pending job with this id. Returns whether one existed.
    async fn remove(&self, id: &JobId) -> Result<bool, QueueError>;

    /// Remove and return the earliest job whose not-before time is `<= now`.
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError>;

    /// Look at a pending job without claiming it.
    async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError>;

    /// Number of pending jobs.
    async fn len(&self) -> Result<usize, QueueError>;
}
