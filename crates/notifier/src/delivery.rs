//! Delivery client: sends one notification and classifies the outcome.
//!
//! This is the only place that decides whether a failure is permanent (the
//! recipient is gone, drop the job) or transient (worth logging, maybe retrying).
//! Workers act on [`DeliveryOutcome`] and never look at raw transport errors.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use chexmix_common::types::{NotificationPayload, Subscription};

use crate::transport::{PushTransport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The subscription is expired, revoked or unusable. Never retried.
    PermanentFailure(String),
    /// Network trouble or a non-success status from the push service.
    TransientFailure(String),
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::PermanentFailure(_) => "permanent_failure",
            DeliveryOutcome::TransientFailure(_) => "transient_failure",
        }
    }
}

pub struct DeliveryClient {
    transport: Arc<dyn PushTransport>,
    ttl_seconds: u32,
    timeout: Duration,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn PushTransport>, ttl_seconds: u32, timeout: Duration) -> Self {
        Self {
            transport,
            ttl_seconds,
            timeout,
        }
    }

    /// Deliver `payload` to `subscription`.
    ///
    /// The attempt is bounded by the configured timeout; running out of time
    /// counts as a transient failure.
    pub async fn deliver(
        &self,
        subscription: &Subscription,
        payload: &NotificationPayload,
    ) -> DeliveryOutcome {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => return DeliveryOutcome::PermanentFailure(format!("unencodable payload: {e}")),
        };

        let attempt = self.transport.send(subscription, &body, self.ttl_seconds);
        let result = tokio::time::timeout(self.timeout, attempt)
            .await
            .unwrap_or_else(|_| Err(TransportError::Timeout(self.timeout.as_millis())));

        Self::classify(result)
    }

    /// Map a transport result to an outcome.
    pub fn classify(result: Result<StatusCode, TransportError>) -> DeliveryOutcome {
        match result {
            Ok(status) if status.is_success() => DeliveryOutcome::Delivered,
            Ok(StatusCode::GONE) => {
                DeliveryOutcome::PermanentFailure("subscription expired (410)".to_string())
            }
            Ok(status) => DeliveryOutcome::TransientFailure(format!("push service returned {status}")),
            Err(TransportError::Encryption(reason)) => DeliveryOutcome::PermanentFailure(reason),
            Err(TransportError::Network(reason)) => DeliveryOutcome::TransientFailure(reason),
            Err(err @ TransportError::Timeout(_)) => {
                DeliveryOutcome::TransientFailure(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct SlowTransport;

    #[async_trait]
    impl PushTransport for SlowTransport {
        async fn send(
            &self,
            _subscription: &Subscription,
            _payload: &[u8],
            _ttl_seconds: u32,
        ) -> Result<StatusCode, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(StatusCode::CREATED)
        }
    }

    #[test]
    fn test_success_statuses_are_delivered() {
        assert_eq!(
            DeliveryClient::classify(Ok(StatusCode::CREATED)),
            DeliveryOutcome::Delivered
        );
        assert_eq!(
            DeliveryClient::classify(Ok(StatusCode::OK)),
            DeliveryOutcome::Delivered
        );
    }

    #[test]
    fn test_gone_is_permanent() {
        let outcome = DeliveryClient::classify(Ok(StatusCode::GONE));
        assert!(matches!(outcome, DeliveryOutcome::PermanentFailure(_)));
    }

    #[test]
    fn test_other_statuses_are_transient() {
        for status in [
            StatusCode::NOT_FOUND,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
        ] {
            let outcome = DeliveryClient::classify(Ok(status));
            assert!(
                matches!(outcome, DeliveryOutcome::TransientFailure(_)),
                "{status} should be transient"
            );
        }
    }

    #[test]
    fn test_transport_errors() {
        let outcome = DeliveryClient::classify(Err(TransportError::Network("reset".into())));
        assert_eq!(outcome, DeliveryOutcome::TransientFailure("reset".into()));

        let outcome = DeliveryClient::classify(Err(TransportError::Encryption("bad key".into())));
        assert_eq!(outcome, DeliveryOutcome::PermanentFailure("bad key".into()));

        let outcome = DeliveryClient::classify(Err(TransportError::Timeout(5000)));
        assert_eq!(
            outcome,
            DeliveryOutcome::TransientFailure("no response within 5000ms".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient() {
        let client = DeliveryClient::new(Arc::new(SlowTransport), 180, Duration::from_secs(5));
        let payload = NotificationPayload {
            title: "Test".to_string(),
            body: None,
        };
        let sub = Subscription::new("https://push.example/abc123", "k", "a");

        let outcome = client.deliver(&sub, &payload).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::TransientFailure("no response within 5000ms".into())
        );
    }
}
