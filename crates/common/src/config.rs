use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen port
    pub port: u16,

    /// Redis connection string. When absent the queue lives in process memory.
    pub redis_url: Option<String>,

    /// Key namespace for the Redis-backed queue
    pub queue_prefix: String,

    /// VAPID public key (base64url, uncompressed P-256 point)
    pub vapid_public_key: Option<String>,

    /// VAPID private key (base64url)
    pub vapid_private_key: Option<String>,

    /// VAPID `sub` claim, usually a mailto: contact
    pub vapid_subject: String,

    /// Shared key required in `x-api-key` on mutating routes, if set
    pub schedule_api_key: Option<String>,

    /// TTL handed to the push service with every message
    pub push_ttl_seconds: u32,

    /// Upper bound on a single delivery round trip in milliseconds
    pub delivery_timeout_ms: u64,

    /// Number of in-process worker tasks (default: 1)
    pub worker_concurrency: usize,

    /// Worker idle sleep when nothing is due, in milliseconds
    pub worker_poll_interval_ms: u64,

    /// Retry policy for transient delivery failures: none | fixed | exponential
    pub retry_policy: String,

    /// Total delivery attempts, first one included, when retries are enabled
    pub retry_max_attempts: u32,

    /// Fixed retry delay, or exponential base, in milliseconds
    pub retry_base_delay_ms: u64,

    /// Cap on the exponential retry delay in milliseconds
    pub retry_max_delay_ms: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            port: parse_var("PORT", "8080")?,
            redis_url: optional_var("REDIS_URL"),
            queue_prefix: std::env::var("QUEUE_PREFIX")
                .unwrap_or_else(|_| "chexmix-push".to_string()),
            vapid_public_key: optional_var("VAPID_PUBLIC_KEY"),
            vapid_private_key: optional_var("VAPID_PRIVATE_KEY"),
            vapid_subject: std::env::var("VAPID_SUBJECT")
                .unwrap_or_else(|_| "mailto:push@chexmix.local".to_string()),
            schedule_api_key: optional_var("SCHEDULE_API_KEY"),
            push_ttl_seconds: parse_var("PUSH_TTL_SECONDS", "180")?,
            delivery_timeout_ms: parse_var("DELIVERY_TIMEOUT_MS", "10000")?,
            worker_concurrency: parse_var("WORKER_CONCURRENCY", "1")?,
            worker_poll_interval_ms: parse_var("WORKER_POLL_INTERVAL_MS", "500")?,
            retry_policy: std::env::var("RETRY_POLICY").unwrap_or_else(|_| "none".to_string()),
            retry_max_attempts: parse_var("RETRY_MAX_ATTEMPTS", "3")?,
            retry_base_delay_ms: parse_var("RETRY_BASE_DELAY_MS", "1000")?,
            retry_max_delay_ms: parse_var("RETRY_MAX_DELAY_MS", "60000")?,
        })
    }

    /// Both halves of the VAPID key pair, if configured.
    pub fn vapid_keys(&self) -> Option<(&str, &str)> {
        match (&self.vapid_public_key, &self.vapid_private_key) {
            (Some(public), Some(private)) => Some((public.as_str(), private.as_str())),
            _ => None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            redis_url: None,
            queue_prefix: "chexmix-push".to_string(),
            vapid_public_key: None,
            vapid_private_key: None,
            vapid_subject: "mailto:push@chexmix.local".to_string(),
            schedule_api_key: None,
            push_ttl_seconds: 180,
            delivery_timeout_ms: 10_000,
            worker_concurrency: 1,
            worker_poll_interval_ms: 500,
            retry_policy: "none".to_string(),
            retry_max_attempts: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 60_000,
        }
    }
}

/// Read a variable, treating an empty value the same as an unset one.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                name,
                std::any::type_name::<T>()
            )
        })
}
