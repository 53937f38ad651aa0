//! Selection of records for submission.

use std::sync::Arc;

use tessera_ledger::{ChainKey, Clock, LedgerStorage, SystemClock};
use tracing::debug;

use crate::batch::SubmissionBatch;
use crate::error::SubmissionResult;

/// Groups unsent records into bounded batches.
pub struct SubmissionBatcher {
    storage: Arc<dyn LedgerStorage>,
    clock: Arc<dyn Clock>,
}

impl SubmissionBatcher {
    /// Create a batcher reading from `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    /// Create a batcher stamping batches with `clock`.
    #[must_use]
    pub fn with_clock(storage: Arc<dyn LedgerStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Select the oldest `Pending` or `Error` records of `chain`, at most
    /// `max_size`, in sequence order.
    ///
    /// The returned batch is `Queued` and may be empty. Record status is not
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read.
    pub fn next_batch(&self, chain: &ChainKey, max_size: usize) -> SubmissionResult<SubmissionBatch> {
        let records = if max_size == 0 {
            Vec::new()
        } else {
            self.storage.submittable(chain, max_size)?
        };
        let batch = SubmissionBatch::queued_at(chain.clone(), records, self.clock.now());
        debug!(
            chain = %chain,
            batch_id = %batch.id(),
            records = batch.len(),
            first = batch.records().first().map(|r| r.sequence_id()),
            "Assembled submission batch"
        );
        Ok(batch)
    }
}

impl std::fmt::Debug for SubmissionBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionBatcher").finish_non_exhaustive()
    }
}
