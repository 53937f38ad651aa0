//! Retry policy with exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential backoff for transient submission failures.
///
/// The delay before retry `n` (1-based) is `base * 2^(n-1)`, capped at
/// `max_delay`. With jitter enabled the delay is drawn uniformly from
/// `[d/2, d]`, which keeps it growing while spreading out tenants that
/// failed together. `max_delay` also caps server `Retry-After` hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any backoff delay.
    pub max_delay: Duration,
    /// Randomize delays.
    #[serde(default)]
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a policy without jitter.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Backoff before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        let capped = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        if self.jitter && !capped.is_zero() {
            let ms = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(fastrand::u64(ms / 2..=ms))
        } else {
            capped
        }
    }

    /// Delay before retry number `retry`, honoring a server hint.
    ///
    /// A `Retry-After` hint longer than the computed backoff is used instead
    /// of it, but never beyond `max_delay`. A shorter hint is ignored.
    #[must_use]
    pub fn delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(retry);
        retry_after.map_or(backoff, |hint| hint.min(self.max_delay).max(backoff))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30), Duration::from_secs(30 * 16))
    }
}
