//! # Bounded Conflict Retry
//!
//! Compare-and-set writes fail with [`StatusError::Conflict`] when another
//! writer got there first. Callers re-read and try again a bounded number
//! of times; when the bound is exhausted the conflict becomes
//! [`StatusError::Contention`]. A `Conflict` never escapes this module.
//!
//! Between attempts the loop sleeps with exponential backoff and jitter
//! (1ms, 2ms, 4ms ... capped at 64ms, each drawn from the upper half of
//! its window) so writers contending for one shard spread out.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use vcsl_core::StatusError;

/// Delay before the second attempt; doubles per attempt.
const BASE_DELAY: Duration = Duration::from_millis(1);

/// Upper bound on any single delay.
const MAX_DELAY: Duration = Duration::from_millis(64);

/// How many times a compare-and-set loop may run, and how long it waits
/// between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

    /// A policy allowing `max_attempts` tries (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }

    /// Override the backoff window. `max` is raised to `base` if smaller.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max.max(base);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound of the wait after failed attempt `attempt` (1-based).
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Jittered wait after failed attempt `attempt`, in
    /// `[ceiling / 2, ceiling]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        let nanos = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);
        if nanos == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(nanos / 2..=nanos))
    }

    /// Run `op` until it succeeds, fails with a non-conflict error, or the
    /// attempt budget runs out. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, resource: &str, mut op: F) -> Result<T, StatusError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StatusError>>,
    {
        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Err(err) if err.is_conflict() => {
                    if attempt == self.max_attempts {
                        break;
                    }
                    let delay = self.backoff(attempt);
                    tracing::debug!(
                        resource = %resource,
                        attempt,
                        ?delay,
                        error = %err,
                        "compare-and-set conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
        tracing::warn!(
            resource = %resource,
            attempts = self.max_attempts,
            "retry budget exhausted"
        );
        Err(StatusError::Contention {
            resource: resource.to_string(),
            attempts: self.max_attempts,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}
