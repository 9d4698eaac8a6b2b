//! Scheduler: the public `schedule` / `cancel` contract.
//!
//! Translates client requests into queue upserts and removals keyed on the
//! subscription identity. It never talks to the delivery side; workers pick
//! jobs up from the queue on their own schedule.

use std::sync::Arc;

use chrono::TimeDelta;
use thiserror::Error;

use chexmix_common::clock::Clock;
use chexmix_common::error::AppError;
use chexmix_common::types::{Job, JobId, NotificationPayload, Subscription};

use crate::capability::Capability;
use crate::identity::job_id;

/// Request-time scheduling failures, visible to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid payload: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Unavailable(String),
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidRequest(msg) => AppError::Validation(msg),
            ScheduleError::Unavailable(msg) => AppError::Unavailable(msg),
        }
    }
}

/// Result of a successful `schedule` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub job_id: JobId,
    /// Milliseconds from now until the job becomes due, never negative.
    pub delay_ms: u64,
}

#[derive(Clone)]
pub struct Scheduler {
    capability: Capability,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(capability: Capability, clock: Arc<dyn Clock>) -> Self {
        Self { capability, clock }
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Schedule a single notification for `subscription` at `deliver_at_ms`
    /// (epoch milliseconds), replacing any notification already pending for it.
    ///
    /// A time in the past is clamped to now.
    pub async fn schedule(
        &self,
        subscription: Subscription,
        deliver_at_ms: f64,
        title: String,
        body: Option<String>,
    ) -> Result<ScheduledJob, ScheduleError> {
        let queue = match &self.capability {
            Capability::Enabled { queue, .. } => queue,
            Capability::Disabled { reason } => {
                return Err(ScheduleError::Unavailable(reason.clone()));
            }
        };

        if subscription.endpoint.is_empty() {
            return Err(ScheduleError::InvalidRequest(
                "subscription endpoint is required".to_string(),
            ));
        }
        if !deliver_at_ms.is_finite() {
            return Err(ScheduleError::InvalidRequest(
                "atMs must be a finite number".to_string(),
            ));
        }

        let now = self.clock.now();
        let delay_ms = (deliver_at_ms - now.timestamp_millis() as f64).round().max(0.0);
        let not_before = TimeDelta::try_milliseconds(delay_ms as i64)
            .and_then(|delay| now.checked_add_signed(delay))
            .ok_or_else(|| ScheduleError::InvalidRequest("atMs is out of range".to_string()))?;

        let id = job_id(&subscription.endpoint);
        let job = Job {
            id: id.clone(),
            not_before,
            payload: NotificationPayload { title, body },
            subscription,
            attempt: 0,
        };

        queue.upsert(job).await.map_err(|e| {
            tracing::error!(job_id = %id, error = %e, "Failed to enqueue scheduled push");
            ScheduleError::Unavailable("push scheduling unavailable".to_string())
        })?;

        tracing::info!(job_id = %id, delay_ms = delay_ms as u64, "Push scheduled");

        Ok(ScheduledJob {
            job_id: id,
            delay_ms: delay_ms as u64,
        })
    }

    /// Cancel whatever is pending for `subscription`.
    ///
    /// Never fails: with scheduling disabled, a missing endpoint or an
    /// unreachable queue the desired end state already holds or cannot be
    /// improved on. Returns the job id when one could be derived and the
    /// removal was attempted.
    pub async fn cancel(&self, subscription: &Subscription) -> Option<JobId> {
        let queue = self.capability.queue()?;
        if subscription.endpoint.is_empty() {
            return None;
        }

        let id = job_id(&subscription.endpoint);
        match queue.remove(&id).await {
            Ok(removed) => {
                tracing::info!(job_id = %id, removed, "Scheduled push cancelled");
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Cancel could not reach the queue");
            }
        }
        Some(id)
    }
}
