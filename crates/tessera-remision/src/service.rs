//! One submission cycle per chain: select, submit, reconcile.

use std::sync::Arc;
use std::time::Duration;

use tessera_ledger::{ChainKey, Clock, LedgerStorage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::applier::{ReconciliationApplier, ReconciliationReport};
use crate::batch::SubmissionBatch;
use crate::batcher::SubmissionBatcher;
use crate::circuit::CircuitBreaker;
use crate::client::{RemisionOutcome, RemisionResult, RemoteSubmissionClient};
use crate::error::{RemisionError, SubmissionResult};
use crate::flow::FlowControl;

/// Default upper bound on records per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Why a cycle did not submit anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The circuit for this chain is open.
    CircuitOpen {
        /// Time until submissions resume.
        remaining: Duration,
    },
    /// The previous submission was too recent.
    FlowControl {
        /// Time until the next slot.
        wait: Duration,
    },
    /// No `Pending` or `Error` records.
    NothingToSend,
}

/// What one cycle did.
#[derive(Debug)]
pub enum CycleReport {
    /// Nothing was sent.
    Skipped(SkipReason),
    /// A batch was submitted and reconciled.
    Submitted {
        /// The batch, in its final status.
        batch: SubmissionBatch,
        /// Client result.
        result: RemisionResult,
        /// Status changes applied.
        report: ReconciliationReport,
    },
}

/// Drives batching, submission and reconciliation for every chain.
///
/// Chains are independent: each has its own circuit and flow-control slot,
/// and [`run_all`](Self::run_all) runs one task per chain.
pub struct RemisionService {
    storage: Arc<dyn LedgerStorage>,
    batcher: SubmissionBatcher,
    client: RemoteSubmissionClient,
    applier: ReconciliationApplier,
    breaker: CircuitBreaker,
    flow: FlowControl,
    max_batch_size: usize,
    cancel: CancellationToken,
}

impl RemisionService {
    /// Create a service with default batch size, circuit breaker and flow
    /// control.
    #[must_use]
    pub fn new(storage: Arc<dyn LedgerStorage>, client: RemoteSubmissionClient) -> Self {
        Self {
            batcher: SubmissionBatcher::new(Arc::clone(&storage)),
            applier: ReconciliationApplier::new(Arc::clone(&storage)),
            storage,
            client,
            breaker: CircuitBreaker::new(5, Duration::from_secs(300)),
            flow: FlowControl::new(Duration::from_secs(60)),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    /// Stamp batches and status changes with `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.batcher = SubmissionBatcher::with_clock(Arc::clone(&self.storage), Arc::clone(&clock));
        self.applier = ReconciliationApplier::with_clock(Arc::clone(&self.storage), clock);
        self
    }

    /// Cap the records per batch.
    #[must_use]
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Replace the circuit breaker.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    /// Replace the flow control.
    #[must_use]
    pub fn with_flow_control(mut self, flow: FlowControl) -> Self {
        self.flow = flow;
        self
    }

    /// Token that cancels in-flight submissions when fired.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one cycle for `chain`.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails while selecting or reconciling.
    pub async fn run_cycle(&self, chain: &ChainKey) -> SubmissionResult<CycleReport> {
        if let Err(remaining) = self.breaker.check(chain) {
            debug!(chain = %chain, remaining_secs = remaining.as_secs(), "Circuit open, skipping");
            return Ok(CycleReport::Skipped(SkipReason::CircuitOpen { remaining }));
        }

        let mut batch = self.batcher.next_batch(chain, self.max_batch_size)?;
        if batch.is_empty() {
            return Ok(CycleReport::Skipped(SkipReason::NothingToSend));
        }

        if let Err(wait) = self.flow.try_acquire(chain) {
            debug!(chain = %chain, wait_secs = wait.as_secs(), "Flow control, skipping");
            return Ok(CycleReport::Skipped(SkipReason::FlowControl { wait }));
        }

        let result = self
            .client
            .submit_with_cancel(&mut batch, &self.cancel)
            .await?;

        // Only an unreachable authority trips the circuit; any parsed answer
        // closes it again.
        match &result.outcome {
            RemisionOutcome::Exhausted { .. } => {
                let _ = self.breaker.record_failure(chain);
            },
            RemisionOutcome::Success { .. }
            | RemisionOutcome::Partial { .. }
            | RemisionOutcome::Rejected { .. } => self.breaker.record_success(chain),
            RemisionOutcome::Permanent { .. } | RemisionOutcome::Cancelled => {},
        }

        let report = self.applier.apply(&batch, &result)?;
        Ok(CycleReport::Submitted {
            batch,
            result,
            report,
        })
    }

    /// Run one cycle for every chain in storage, concurrently.
    ///
    /// A failing chain does not stop the others; its error is returned in
    /// its slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain list cannot be read.
    pub async fn run_all(
        self: &Arc<Self>,
    ) -> SubmissionResult<Vec<(ChainKey, SubmissionResult<CycleReport>)>> {
        let chains = self.storage.chains()?;
        info!(chains = chains.len(), "Starting submission cycle");

        let handles: Vec<_> = chains
            .into_iter()
            .map(|chain| {
                let service = Arc::clone(self);
                let key = chain.clone();
                (
                    chain,
                    tokio::spawn(async move { service.run_cycle(&key).await }),
                )
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (chain, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(RemisionError::Task(e.to_string())),
            };
            if let Err(e) = &outcome {
                warn!(chain = %chain, error = %e, "Submission cycle failed");
            }
            results.push((chain, outcome));
        }
        Ok(results)
    }
}

impl std::fmt::Debug for RemisionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemisionService")
            .field("client", &self.client)
            .field("max_batch_size", &self.max_batch_size)
            .finish_non_exhaustive()
    }
}
