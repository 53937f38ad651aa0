//! Submission batches.
//!
//! ```text
//! Queued ──► Sending ──► Completed
//!   ▲           │ ├────► PartiallyFailed
//!   │           │ └────► Failed ──(requeue)──┐
//!   └───────────┘ (retries exhausted,        │
//!   ▲              cancelled)                │
//!   └────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_ledger::{ChainKey, Clock, LedgerRecord, SystemClock};
use uuid::Uuid;

use crate::error::{RemisionError, SubmissionResult};

/// Unique batch identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    /// Create a new random batch id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Waiting to be sent.
    Queued,
    /// A submission is in flight.
    Sending,
    /// Every record accepted.
    Completed,
    /// Some records accepted, some rejected.
    PartiallyFailed,
    /// Rejected as a whole, or permanently refused.
    Failed,
}

impl BatchStatus {
    /// Whether `self -> next` is a legal batch transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Sending)
                | (
                    Self::Sending,
                    Self::Queued | Self::Completed | Self::PartiallyFailed | Self::Failed
                )
                | (Self::Failed, Self::Queued)
        )
    }

    /// Whether the batch is finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyFailed | Self::Failed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
            Self::Failed => "failed",
        })
    }
}

/// An ordered set of records selected for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionBatch {
    id: BatchId,
    chain: ChainKey,
    records: Vec<LedgerRecord>,
    status: BatchStatus,
    accepted_count: usize,
    rejected_count: usize,
    attempts: u32,
    created_at: DateTime<Utc>,
}

impl SubmissionBatch {
    /// Create a queued batch stamped with the system clock. `records` must
    /// be in sequence order.
    #[must_use]
    pub fn new(chain: ChainKey, records: Vec<LedgerRecord>) -> Self {
        Self::queued_at(chain, records, SystemClock.now())
    }

    /// Create a queued batch created at `created_at`.
    #[must_use]
    pub fn queued_at(
        chain: ChainKey,
        records: Vec<LedgerRecord>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BatchId::new(),
            chain,
            records,
            status: BatchStatus::Queued,
            accepted_count: 0,
            rejected_count: 0,
            attempts: 0,
            created_at,
        }
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`RemisionError::InvalidBatchState`] for a transition the
    /// lifecycle does not allow.
    pub fn transition(&mut self, next: BatchStatus) -> SubmissionResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(RemisionError::InvalidBatchState {
                batch_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Put a failed batch back in the queue after manual intervention.
    ///
    /// # Errors
    ///
    /// Returns [`RemisionError::InvalidBatchState`] unless the batch failed.
    pub fn requeue(&mut self) -> SubmissionResult<()> {
        if self.status != BatchStatus::Failed {
            return Err(RemisionError::InvalidBatchState {
                batch_id: self.id,
                from: self.status,
                to: BatchStatus::Queued,
            });
        }
        self.transition(BatchStatus::Queued)
    }

    pub(crate) fn record_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub(crate) fn set_counts(&mut self, accepted: usize, rejected: usize) {
        self.accepted_count = accepted;
        self.rejected_count = rejected;
    }

    /// Batch id.
    #[must_use]
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Chain the records come from.
    #[must_use]
    pub fn chain(&self) -> &ChainKey {
        &self.chain
    }

    /// Records in sequence order.
    #[must_use]
    pub fn records(&self) -> &[LedgerRecord] {
        &self.records
    }

    /// Sequence ids in order.
    #[must_use]
    pub fn sequence_ids(&self) -> Vec<u64> {
        self.records.iter().map(LedgerRecord::sequence_id).collect()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        self.status
    }

    /// Records the authority accepted.
    #[must_use]
    pub fn accepted_count(&self) -> usize {
        self.accepted_count
    }

    /// Records the authority rejected.
    #[must_use]
    pub fn rejected_count(&self) -> usize {
        self.rejected_count
    }

    /// Transport attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the batch was assembled.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
