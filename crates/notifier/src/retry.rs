//! Retry policy for transient delivery failures.
//!
//! `None` is the default: a failed attempt is logged and the notification is
//! dropped. Retries are opt-in through `RETRY_POLICY`.

use std::time::Duration;

use chexmix_common::config::AppConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    #[default]
    None,
    Fixed {
        max_attempts: u32,
        delay: Duration,
    },
    Exponential {
        max_attempts: u32,
        base: Duration,
        max: Duration,
    },
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let max_attempts = config.retry_max_attempts.max(1);
        let base = Duration::from_millis(config.retry_base_delay_ms);

        match config.retry_policy.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "fixed" => Ok(Self::Fixed {
                max_attempts,
                delay: base,
            }),
            "exponential" => Ok(Self::Exponential {
                max_attempts,
                base,
                max: Duration::from_millis(config.retry_max_delay_ms),
            }),
            other => Err(anyhow::anyhow!(
                "RETRY_POLICY must be one of none, fixed, exponential (got '{}')",
                other
            )),
        }
    }

    /// Delay before the next attempt, given how many attempts have been made.
    ///
    /// Returns `None` once the attempt budget is spent.
    pub fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        match *self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed {
                max_attempts,
                delay,
            } => (attempts_made < max_attempts).then_some(delay),
            RetryPolicy::Exponential {
                max_attempts,
                base,
                max,
            } => {
                if attempts_made >= max_attempts {
                    return None;
                }
                let factor = 2u32.saturating_pow(attempts_made.saturating_sub(1));
                Some(base.saturating_mul(factor).min(max))
            }
        }
    }
}
