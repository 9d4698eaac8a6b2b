//! In-process queue backend.
//!
//! Best-effort only: pending jobs are lost when the process exits. Used when no
//! `REDIS_URL` is configured and throughout the test suite.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use chexmix_common::types::{Job, JobId};

use super::{DelayedQueue, QueueError};

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    /// Due index ordered by (not_before, id).
    due: BTreeSet<(DateTime<Utc>, JobId)>,
}

impl State {
    fn insert(&mut self, job: Job) {
        if let Some(previous) = self.jobs.remove(&job.id) {
            self.due.remove(&(previous.not_before, previous.id));
        }
        self.due.insert((job.not_before, job.id.clone()));
        self.jobs.insert(job.id.clone(), job);
    }

    fn take(&mut self, id: &JobId) -> Option<Job> {
        let job = self.jobs.remove(id)?;
        self.due.remove(&(job.not_before, job.id.clone()));
        Some(job)
    }
}

/// In-memory [`DelayedQueue`]. All mutation goes through one lock.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DelayedQueue for MemoryQueue {
    async fn upsert(&self, job: Job) -> Result<(), QueueError> {
        self.state.lock().await.insert(job);
        Ok(())
    }

    async fn requeue(&self, job: Job) -> Result<bool, QueueError> {
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Ok(false);
        }
        state.insert(job);
        Ok(true)
    }

    async fn remove(&self, id: &JobId) -> Result<bool, QueueError> {
        Ok(self.state.lock().await.take(id).is_some())
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        let mut state = self.state.lock().await;
        let id = match state.due.first() {
            Some((not_before, id)) if *not_before <= now => id.clone(),
            _ => return Ok(None),
        };
        Ok(state.take(&id))
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        Ok(self.state.lock().await.jobs.get(id).cloned())
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().await.jobs.len())
    }
}
