use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keys a push service subscription carries for payload encryption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Recipient's P-256 ECDH public key (base64url).
    #[serde(default)]
    pub p256dh: String,
    /// Recipient's authentication secret (base64url).
    #[serde(default)]
    pub auth: String,
}

/// A recipient's push subscription, as produced by the browser's `PushManager`.
///
/// Fields are defaulted so that a structurally incomplete subscription still
/// deserializes and can be rejected by validation rather than by the decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub keys: SubscriptionKeys,
}

impl Subscription {
    pub fn new(
        endpoint: impl Into<String>,
        p256dh: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: SubscriptionKeys {
                p256dh: p256dh.into(),
                auth: auth.into(),
            },
        }
    }
}

/// The user-visible content of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Identifier of a scheduled job, derived from the subscription endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One pending notification for one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub not_before: DateTime<Utc>,
    pub payload: NotificationPayload,
    pub subscription: Subscription,
    /// Delivery attempts already made for this job (0 for a fresh schedule).
    #[serde(default)]
    pub attempt: u32,
}

impl Job {
    /// Whether the job is eligible for dispatch at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now
    }
}
