//! Per-chain circuit breaker.
//!
//! After `threshold` consecutive failed cycles for a chain, submissions for
//! that chain pause for `pause`. The first success closes the circuit again.

use std::time::Duration;

use dashmap::DashMap;
use tessera_ledger::ChainKey;
use tokio::time::Instant;
use tracing::{error, info};

#[derive(Debug, Default, Clone, Copy)]
struct CircuitState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Tracks consecutive submission failures per chain.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    pause: Duration,
    states: DashMap<ChainKey, CircuitState>,
}

impl CircuitBreaker {
    /// Create a breaker opening after `threshold` consecutive failures.
    #[must_use]
    pub fn new(threshold: u32, pause: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            pause,
            states: DashMap::new(),
        }
    }

    /// `Err(remaining)` while the circuit for `chain` is open.
    ///
    /// # Errors
    ///
    /// Returns the remaining pause while the circuit is open.
    pub fn check(&self, chain: &ChainKey) -> Result<(), Duration> {
        let Some(state) = self.states.get(chain) else {
            return Ok(());
        };
        match state.open_until {
            Some(until) => {
                let now = Instant::now();
                if now < until {
                    Err(until.saturating_duration_since(now))
                } else {
                    Ok(())
                }
            },
            None => Ok(()),
        }
    }

    /// Record a successful cycle, closing the circuit.
    pub fn record_success(&self, chain: &ChainKey) {
        let was_open = self
            .states
            .remove(chain)
            .is_some_and(|(_, state)| state.open_until.is_some());
        if was_open {
            info!(chain = %chain, "Submission circuit closed");
        }
    }

    /// Record a failed cycle. Returns `true` if this failure opened the circuit.
    pub fn record_failure(&self, chain: &ChainKey) -> bool {
        let mut state = self.states.entry(chain.clone()).or_default();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures < self.threshold {
            return false;
        }

        state.consecutive_failures = 0;
        state.open_until = Instant::now().checked_add(self.pause);
        error!(
            chain = %chain,
            threshold = self.threshold,
            pause_secs = self.pause.as_secs(),
            "Submission circuit opened after consecutive failures"
        );
        true
    }

    /// Consecutive failures currently counted for `chain`.
    #[must_use]
    pub fn failures(&self, chain: &ChainKey) -> u32 {
        self.states
            .get(chain)
            .map_or(0, |s| s.consecutive_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_ledger::{LedgerKind, TenantId};

    fn chain(tenant: &str) -> ChainKey {
        ChainKey::new(TenantId::new(tenant).unwrap(), LedgerKind::Invoices)
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_reopens_after_pause() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(300));
        let key = chain("acme");

        assert!(!breaker.record_failure(&key));
        assert!(!breaker.record_failure(&key));
        assert!(breaker.check(&key).is_ok());
        assert!(breaker.record_failure(&key));

        let remaining = breaker.check(&key).unwrap_err();
        assert_eq!(remaining, Duration::from_secs(300));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(breaker.check(&key).is_err());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.check(&key).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        let key = chain("acme");
        breaker.record_failure(&key);
        breaker.record_success(&key);
        assert_eq!(breaker.failures(&key), 0);
        assert!(!breaker.record_failure(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chains_are_independent() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        assert!(breaker.record_failure(&chain("acme")));
        assert!(breaker.check(&chain("acme")).is_err());
        assert!(breaker.check(&chain("globex")).is_ok());
    }
}
