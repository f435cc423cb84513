//! Uploader configuration.

use std::time::Duration;

use bigup_transfer::ChunkTiers;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Settings fixed for the lifetime of one [`Uploader`](crate::Uploader).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Maximum number of chunk-upload tasks running at once.
    pub concurrency_limit: usize,
    /// Failed attempts tolerated per chunk before the session fails.
    pub max_retries: u32,
    /// Persist session records while uploads are in flight.
    pub persist: bool,
    /// Delay after a breakpoint is detected, before the chunk loop starts.
    pub breakpoint_settle_ms: u64,
    /// Upper bound of the random delay before a queued task is admitted.
    pub dispatch_jitter_ms: u64,
    pub retry_backoff: RetryBackoff,
    pub chunk_tiers: ChunkTiers,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            max_retries: 3,
            persist: false,
            breakpoint_settle_ms: 1000,
            dispatch_jitter_ms: 20,
            retry_backoff: RetryBackoff::default(),
            chunk_tiers: ChunkTiers::default(),
        }
    }
}

impl UploaderConfig {
    pub fn breakpoint_settle(&self) -> Duration {
        Duration::from_millis(self.breakpoint_settle_ms)
    }

    pub fn dispatch_jitter(&self) -> Duration {
        Duration::from_millis(self.dispatch_jitter_ms)
    }
}

/// Exponential backoff between attempts of the same chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryBackoff {
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Backoff cap.
    pub max_delay_ms: u64,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial_delay_ms: 200,
            max_delay_ms: 5000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryBackoff {
    /// No delay at all between attempts.
    pub fn none() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_factor: 1.0,
        }
    }

    /// Calculates the delay before retry number `attempt` (1-based),
    /// with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let ms = self.initial_delay_ms as f64 * self.backoff_factor.powi(exp);
        let capped = ms.min(self.max_delay_ms as f64);
        if capped <= 0.0 {
            return Duration::ZERO;
        }
        let offset: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        let with_jitter = (capped + capped * 0.25 * offset).max(1.0);
        Duration::from_secs_f64(with_jitter / 1000.0)
    }
}
