//! Delays between provider calls.
//!
//! All waiting in the generation core goes through [`Sleeper`], so tests can
//! observe the requested delays without actually sleeping.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Pause after every set except the last one.
    pub inter_set_delay: Duration,
    /// Delay before the second attempt on a failed set; doubles afterwards.
    pub retry_base_delay: Duration,
    /// Upper bound for any single backoff delay.
    pub retry_max_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            inter_set_delay: Duration::from_secs(2),
            retry_base_delay: Duration::from_secs(2),
            retry_max_delay: Duration::from_secs(60),
        }
    }
}

impl Pacing {
    pub fn immediate() -> Self {
        Self {
            inter_set_delay: Duration::ZERO,
            retry_base_delay: Duration::ZERO,
            retry_max_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry attempt `attempt` (1-based). The first attempt
    /// runs immediately; attempt 2 waits the base delay, attempt 3 twice that.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.retry_base_delay
            .checked_mul(factor)
            .unwrap_or(self.retry_max_delay)
            .min(self.retry_max_delay)
    }
}
