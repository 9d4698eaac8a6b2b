//! Scheduling capability: whether the feature is switched on, and with which queue.
//!
//! Built once at startup from [`AppConfig`] and handed to the scheduler and the
//! workers. Nothing downstream inspects configuration or environment directly.

use std::sync::Arc;

use chexmix_common::config::AppConfig;
use chexmix_common::redis_pool::connect_queue_redis;

use crate::queue::{DelayedQueue, MemoryQueue, RedisQueue};

/// Which kind of queue backs an enabled capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Redis,
    Memory,
}

#[derive(Clone)]
pub enum Capability {
    Enabled {
        queue: Arc<dyn DelayedQueue>,
        kind: QueueKind,
    },
    Disabled {
        reason: String,
    },
}

impl Capability {
    /// Derive the capability from configuration, connecting to Redis if configured.
    ///
    /// Without delivery credentials nothing could ever be sent, so scheduling is
    /// disabled regardless of the queue backend.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        if config.vapid_keys().is_none() {
            tracing::warn!("VAPID keys not set; push scheduling will be disabled");
            return Ok(Self::disabled("push scheduling unavailable"));
        }

        match &config.redis_url {
            Some(url) => {
                let redis = connect_queue_redis(url).await?;
                tracing::info!(prefix = %config.queue_prefix, "Using Redis delayed queue");
                Ok(Self::Enabled {
                    queue: Arc::new(RedisQueue::new(redis, config.queue_prefix.clone())),
                    kind: QueueKind::Redis,
                })
            }
            None => {
                tracing::warn!(
                    "REDIS_URL not set; scheduled pushes are kept in memory and lost on restart"
                );
                Ok(Self::Enabled {
                    queue: Arc::new(MemoryQueue::new()),
                    kind: QueueKind::Memory,
                })
            }
        }
    }

    /// An enabled capability over an arbitrary queue.
    pub fn enabled(queue: Arc<dyn DelayedQueue>) -> Self {
        Self::Enabled {
            queue,
            kind: QueueKind::Memory,
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::Disabled {
            reason: reason.into(),
        }
    }

    /// The queue, if scheduling is enabled.
    pub fn queue(&self) -> Option<&Arc<dyn DelayedQueue>> {
        match self {
            Self::Enabled { queue, .. } => Some(queue),
            Self::Disabled { .. } => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled { kind, .. } => f.debug_struct("Enabled").field("kind", kind).finish(),
            Self::Disabled { reason } => {
                f.debug_struct("Disabled").field("reason", reason).finish()
            }
        }
    }
}
