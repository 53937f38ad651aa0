//! Minimum spacing between submissions of one chain.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tessera_ledger::ChainKey;
use tokio::time::Instant;

/// Enforces the authority's minimum interval between submissions.
#[derive(Debug)]
pub struct FlowControl {
    interval: Duration,
    last_sent: DashMap<ChainKey, Instant>,
}

impl FlowControl {
    /// Require at least `interval` between submissions of one chain.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: DashMap::new(),
        }
    }

    /// Claim a submission slot for `chain`.
    ///
    /// # Errors
    ///
    /// Returns the remaining wait if the previous submission was too recent.
    /// No slot is claimed in that case.
    pub fn try_acquire(&self, chain: &ChainKey) -> Result<(), Duration> {
        let now = Instant::now();
        match self.last_sent.entry(chain.clone()) {
            Entry::Occupied(mut last) => {
                let elapsed = now.saturating_duration_since(*last.get());
                if elapsed < self.interval {
                    return Err(self.interval.saturating_sub(elapsed));
                }
                last.insert(now);
            },
            Entry::Vacant(slot) => {
                slot.insert(now);
            },
        }
        Ok(())
    }

    /// The configured interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
