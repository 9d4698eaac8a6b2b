//! Push worker: drains due jobs from the delayed queue and delivers them.
//!
//! Each worker loops forever: claim one due job, hand it to the
//! [`DeliveryClient`], act on the outcome, repeat. When nothing is due it sleeps
//! for the poll interval. Several workers may share one queue; the queue's
//! atomic claim guarantees a job reaches exactly one of them.
//!
//! A job is already out of the queue once claimed, so cancelling or
//! rescheduling it mid-delivery does not stop the in-flight attempt.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;

use chexmix_common::clock::Clock;
use chexmix_common::types::{Job, JobId};
use chexmix_engine::queue::{DelayedQueue, QueueError};

use crate::delivery::{DeliveryClient, DeliveryOutcome};
use crate::retry::RetryPolicy;

/// What happened to one claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub job_id: JobId,
    /// Attempts made so far, this one included.
    pub attempt: u32,
    pub outcome: DeliveryOutcome,
    /// Set when a transient failure was re-enqueued for another attempt.
    pub retry_at: Option<DateTime<Utc>>,
}

pub struct Worker {
    id: usize,
    queue: Arc<dyn DelayedQueue>,
    delivery: Arc<DeliveryClient>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<dyn DelayedQueue>,
        delivery: Arc<DeliveryClient>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            delivery,
            retry,
            clock,
            poll_interval,
        }
    }

    /// Run the worker loop. Never returns; abort the task to stop it.
    pub async fn run(self) {
        tracing::info!(
            worker = self.id,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Push worker started"
        );

        loop {
            match self.process_next().await {
                // Keep draining while jobs are due
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(worker = self.id, error = %e, "Failed to poll push queue");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Claim and dispatch at most one due job.
    ///
    /// Only queue failures while claiming are returned as errors; every
    /// delivery outcome is handled here and reported.
    pub async fn process_next(&self) -> Result<Option<DispatchReport>, QueueError> {
        let Some(mut job) = self.queue.claim_due(self.clock.now()).await? else {
            return Ok(None);
        };

        job.attempt += 1;
        let job_id = job.id.clone();
        let attempt = job.attempt;
        let outcome = self.delivery.deliver(&job.subscription, &job.payload).await;

        let retry_at = match &outcome {
            DeliveryOutcome::Delivered => {
                tracing::info!(worker = self.id, job_id = %job_id, attempt, "Push delivered");
                None
            }
            DeliveryOutcome::PermanentFailure(reason) => {
                tracing::warn!(
                    worker = self.id,
                    job_id = %job_id,
                    endpoint = %job.subscription.endpoint,
                    reason = %reason,
                    "Subscription no longer reachable; dropping push"
                );
                None
            }
            DeliveryOutcome::TransientFailure(reason) => {
                let next_delay = self.retry.next_delay(attempt);
                tracing::error!(
                    worker = self.id,
                    job_id = %job_id,
                    attempt,
                    will_retry = next_delay.is_some(),
                    reason = %reason,
                    "Push send error"
                );
                match next_delay {
                    Some(delay) => self.requeue_after(job, delay).await,
                    None => None,
                }
            }
        };

        Ok(Some(DispatchReport {
            job_id,
            attempt,
            outcome,
            retry_at,
        }))
    }

    /// Put a failed job back for another attempt after `delay`.
    ///
    /// Uses insert-if-absent so a schedule that arrived after the claim wins.
    async fn requeue_after(
        &self,
        mut job: Job,
        delay: Duration,
    ) -> Option<DateTime<Utc>> {
        let id = job.id.clone();
        let Some(not_before) = TimeDelta::from_std(delay)
            .ok()
            .and_then(|delay| self.clock.now().checked_add_signed(delay))
        else {
            tracing::error!(job_id = %id, "Retry delay out of range; dropping push");
            return None;
        };
        job.not_before = not_before;

        match self.queue.requeue(job).await {
            Ok(true) => {
                tracing::warn!(job_id = %id, retry_at = %not_before, "Push retry enqueued");
                Some(not_before)
            }
            Ok(false) => {
                tracing::info!(
                    job_id = %id,
                    "Newer push already scheduled for this subscription; retry skipped"
                );
                None
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Failed to enqueue push retry");
                None
            }
        }
    }
}

/// Spawn `count` workers sharing one queue and delivery client.
pub fn spawn_workers(
    count: usize,
    queue: Arc<dyn DelayedQueue>,
    delivery: Arc<DeliveryClient>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|id| {
            let worker = Worker::new(
                id,
                queue.clone(),
                delivery.clone(),
                retry,
                clock.clone(),
                poll_interval,
            );
            tokio::spawn(worker.run())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chexmix_common::clock::ManualClock;
    use chexmix_common::types::{NotificationPayload, Subscription};
    use chexmix_engine::queue::MemoryQueue;
    use reqwest::StatusCode;

    use crate::transport::{PushTransport, TransportError};

    /// Answers every send with the next scripted status, then 201.
    #[derive(Default)]
    struct ScriptedTransport {
        statuses: Mutex<Vec<StatusCode>>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn send(
            &self,
            subscription: &Subscription,
            _payload: &[u8],
            _ttl_seconds: u32,
        ) -> Result<StatusCode, TransportError> {
            self.sent.lock().unwrap().push(subscription.endpoint.clone());
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.is_empty() {
                Ok(StatusCode::CREATED)
            } else {
                Ok(statuses.remove(0))
            }
        }
    }

    fn job(n: u32, not_before: DateTime<Utc>) -> Job {
        Job {
            id: JobId(format!("job{n}")),
            not_before,
            payload: NotificationPayload {
                title: format!("title {n}"),
                body: None,
            },
            subscription: Subscription::new(format!("https://push.example/{n}"), "k", "a"),
            attempt: 0,
        }
    }

    fn worker(
        statuses: Vec<StatusCode>,
        retry: RetryPolicy,
    ) -> (Worker, Arc<MemoryQueue>, Arc<ScriptedTransport>, Arc<ManualClock>) {
        let queue = Arc::new(MemoryQueue::new());
        let transport = Arc::new(ScriptedTransport {
            statuses: Mutex::new(statuses),
            ..Default::default()
        });
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let delivery = Arc::new(DeliveryClient::new(
            transport.clone(),
            180,
            Duration::from_secs(5),
        ));
        let worker = Worker::new(
            0,
            queue.clone(),
            delivery,
            retry,
            clock.clone(),
            Duration::from_millis(10),
        );
        (worker, queue, transport, clock)
    }

    #[tokio::test]
    async fn test_idle_when_nothing_due() {
        let (worker, queue, transport, clock) = worker(vec![], RetryPolicy::None);
        queue
            .upsert(job(1, clock.now() + TimeDelta::seconds(5)))
            .await
            .unwrap();

        assert!(worker.process_next().await.unwrap().is_none());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivered_job_leaves_queue() {
        let (worker, queue, transport, clock) = worker(vec![], RetryPolicy::None);
        queue.upsert(job(1, clock.now())).await.unwrap();

        let report = worker.process_next().await.unwrap().unwrap();
        assert_eq!(report.outcome, DeliveryOutcome::Delivered);
        assert_eq!(report.attempt, 1);
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gone_subscription_is_dropped_and_others_continue() {
        let (worker, queue, transport, clock) = worker(vec![StatusCode::GONE], RetryPolicy::None);
        queue.upsert(job(1, clock.now())).await.unwrap();
        queue
            .upsert(job(2, clock.now() + TimeDelta::milliseconds(1)))
            .await
            .unwrap();
        clock.advance(TimeDelta::milliseconds(1));

        let first = worker.process_next().await.unwrap().unwrap();
        assert!(matches!(first.outcome, DeliveryOutcome::PermanentFailure(_)));
        assert_eq!(first.retry_at, None);

        let second = worker.process_next().await.unwrap().unwrap();
        assert_eq!(second.outcome, DeliveryOutcome::Delivered);

        assert!(worker.process_next().await.unwrap().is_none());
        assert_eq!(
            *transport.sent.lock().unwrap(),
            vec!["https://push.example/1", "https://push.example/2"]
        );
    }

    #[tokio::test]
    async fn test_transient_failure_without_retry_is_dropped() {
        let (worker, queue, _, clock) =
            worker(vec![StatusCode::INTERNAL_SERVER_ERROR], RetryPolicy::None);
        queue.upsert(job(1, clock.now())).await.unwrap();

        let report = worker.process_next().await.unwrap().unwrap();
        assert!(matches!(report.outcome, DeliveryOutcome::TransientFailure(_)));
        assert_eq!(report.retry_at, None);
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_within_budget() {
        let retry = RetryPolicy::Fixed {
            max_attempts: 2,
            delay: Duration::from_secs(30),
        };
        let (worker, queue, transport, clock) = worker(
            vec![StatusCode::SERVICE_UNAVAILABLE, StatusCode::SERVICE_UNAVAILABLE],
            retry,
        );
        queue.upsert(job(1, clock.now())).await.unwrap();

        let first = worker.process_next().await.unwrap().unwrap();
        assert_eq!(first.retry_at, Some(clock.now() + TimeDelta::seconds(30)));
        let pending = queue.get(&JobId("job1".into())).await.unwrap().unwrap();
        assert_eq!(pending.attempt, 1);

        // Not due yet
        assert!(worker.process_next().await.unwrap().is_none());

        clock.advance(TimeDelta::seconds(30));
        let second = worker.process_next().await.unwrap().unwrap();
        assert_eq!(second.attempt, 2);
        assert_eq!(second.retry_at, None);
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_never_overwrites_newer_schedule() {
        let retry = RetryPolicy::Fixed {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        };
        let (worker, queue, _, clock) = worker(vec![StatusCode::BAD_GATEWAY], retry);
        queue.upsert(job(1, clock.now())).await.unwrap();

        let claimed = queue.claim_due(clock.now()).await.unwrap().unwrap();
        let mut newer = claimed.clone();
        newer.payload.title = "newer".to_string();
        newer.not_before = clock.now() + TimeDelta::minutes(10);
        queue.upsert(newer).await.unwrap();

        // Simulate the failed attempt for the claimed generation
        let retry_at = worker.requeue_after(claimed, Duration::from_secs(1)).await;
        assert_eq!(retry_at, None);

        let pending = queue.get(&JobId("job1".into())).await.unwrap().unwrap();
        assert_eq!(pending.payload.title, "newer");
    }
}
