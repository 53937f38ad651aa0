//! Reconciliation of authority outcomes onto local record status.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_ledger::{
    AuthorityStatus, Clock, LedgerError, LedgerRecord, LedgerStorage, StatusState, SystemClock,
};
use tracing::{debug, info, warn};

use crate::batch::SubmissionBatch;
use crate::client::{RemisionOutcome, RemisionResult};
use crate::error::SubmissionResult;
use crate::protocol::{RecordOutcome, RecordVerdict};

/// Counts from one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Records now `Accepted`.
    pub accepted: usize,
    /// Records now `Rejected`.
    pub rejected: usize,
    /// Records now `Error`.
    pub errored: usize,
    /// Records the response did not mention; left as they were.
    pub unmatched: usize,
    /// Records whose transition the state machine refused.
    pub skipped: usize,
}

impl ReconciliationReport {
    /// Records whose status changed.
    #[must_use]
    pub fn updated(&self) -> usize {
        self.accepted
            .saturating_add(self.rejected)
            .saturating_add(self.errored)
    }
}

/// Writes authority outcomes back onto ledger records.
///
/// Outcomes are matched by correlation id, never by position. Only the
/// authority status of a record is touched; the hash chain is not.
pub struct ReconciliationApplier {
    storage: Arc<dyn LedgerStorage>,
    clock: Arc<dyn Clock>,
}

impl ReconciliationApplier {
    /// Create an applier writing to `storage`, stamping changes with the
    /// system clock.
    #[must_use]
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    /// Create an applier stamping status changes with `clock`.
    #[must_use]
    pub fn with_clock(storage: Arc<dyn LedgerStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Apply `result` to the records of `batch`.
    ///
    /// - Success: matched records follow their verdict, records the response
    ///   omits are `Accepted` under the global confirmation.
    /// - Partial: matched records follow their verdict, omitted records stay
    ///   as they are for the next cycle.
    /// - Permanent: every record becomes `Error` with the HTTP status.
    /// - Rejected, exhausted or cancelled: nothing changes.
    ///
    /// A record in `Error` is first re-armed to `Pending`. Transitions the
    /// state machine refuses are logged and counted as skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails for a reason other than an illegal
    /// transition.
    pub fn apply(
        &self,
        batch: &SubmissionBatch,
        result: &RemisionResult,
    ) -> SubmissionResult<ReconciliationReport> {
        let mut report = ReconciliationReport::default();

        let (confirmation, outcomes, unmatched_accepted) = match &result.outcome {
            RemisionOutcome::Success {
                confirmation,
                records,
            } => (confirmation.clone(), records.as_slice(), true),
            RemisionOutcome::Partial {
                confirmation,
                records,
            } => (confirmation.clone(), records.as_slice(), false),
            RemisionOutcome::Permanent { status, message } => {
                let target = AuthorityStatus::error(Some(status.to_string()), message.clone());
                for record in batch.records() {
                    self.transition(record, target.clone(), &mut report)?;
                }
                return Ok(finish(batch, report));
            },
            RemisionOutcome::Rejected { .. }
            | RemisionOutcome::Exhausted { .. }
            | RemisionOutcome::Cancelled => {
                debug!(
                    batch_id = %batch.id(),
                    outcome = result.outcome.label(),
                    "Nothing to reconcile"
                );
                return Ok(report);
            },
        };

        let by_id: HashMap<&str, &RecordOutcome> = outcomes
            .iter()
            .map(|o| (o.correlation_id.as_str(), o))
            .collect();

        for record in batch.records() {
            let target = match by_id.get(record.correlation_id()) {
                Some(outcome) => status_for(outcome),
                None if unmatched_accepted => AuthorityStatus::accepted(confirmation.clone(), None),
                None => {
                    report.unmatched = report.unmatched.saturating_add(1);
                    continue;
                },
            };
            self.transition(record, target, &mut report)?;
        }

        Ok(finish(batch, report))
    }

    fn transition(
        &self,
        record: &LedgerRecord,
        target: AuthorityStatus,
        report: &mut ReconciliationReport,
    ) -> SubmissionResult<()> {
        let chain = record.chain();
        let seq = record.sequence_id();

        let current = self
            .storage
            .get(chain, seq)?
            .map_or(record.state(), |r| r.state());
        if current == StatusState::Error && target.state != StatusState::Pending {
            if let Err(e) = self.update(record, AuthorityStatus::retry()) {
                return skip_or_fail(e, report);
            }
        }

        let state = target.state;
        if let Err(e) = self.update(record, target) {
            return skip_or_fail(e, report);
        }
        match state {
            StatusState::Accepted => report.accepted = report.accepted.saturating_add(1),
            StatusState::Rejected => report.rejected = report.rejected.saturating_add(1),
            StatusState::Error => report.errored = report.errored.saturating_add(1),
            StatusState::Pending => {},
        }
        Ok(())
    }

    fn update(&self, record: &LedgerRecord, status: AuthorityStatus) -> Result<(), LedgerError> {
        self.storage
            .update_status(
                record.chain(),
                record.sequence_id(),
                status.at(self.clock.now()),
            )
            .map(|_| ())
    }
}

impl std::fmt::Debug for ReconciliationApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationApplier").finish_non_exhaustive()
    }
}

fn finish(batch: &SubmissionBatch, report: ReconciliationReport) -> ReconciliationReport {
    info!(
        batch_id = %batch.id(),
        chain = %batch.chain(),
        updated = report.updated(),
        accepted = report.accepted,
        rejected = report.rejected,
        errored = report.errored,
        unmatched = report.unmatched,
        skipped = report.skipped,
        "Reconciled batch"
    );
    report
}

fn status_for(outcome: &RecordOutcome) -> AuthorityStatus {
    match outcome.verdict {
        RecordVerdict::Accepted | RecordVerdict::AcceptedWithErrors => {
            AuthorityStatus::accepted(outcome.code.clone(), outcome.message.clone())
        },
        RecordVerdict::Rejected => AuthorityStatus::rejected(
            outcome.code.clone().unwrap_or_default(),
            outcome.message.clone().unwrap_or_default(),
        ),
    }
}

fn skip_or_fail(e: LedgerError, report: &mut ReconciliationReport) -> SubmissionResult<()> {
    match e {
        LedgerError::IllegalTransition { .. } => {
            warn!(error = %e, "Skipping record during reconciliation");
            report.skipped = report.skipped.saturating_add(1);
            Ok(())
        },
        other => Err(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchId;
    use crate::error::TransportError;
    use chrono::{DateTime, Utc};
    use tessera_ledger::{
        ChainKey, LedgerAppender, LedgerKind, MemoryLedgerStorage, RecordDraft, RecordType,
        TenantId,
    };

    fn setup(n: usize) -> (Arc<MemoryLedgerStorage>, SubmissionBatch) {
        let storage = Arc::new(MemoryLedgerStorage::new());
        let chain = ChainKey::new(TenantId::new("acme").unwrap(), LedgerKind::Invoices);
        let appender = LedgerAppender::new(storage.clone());
        for i in 1..=n {
            appender
                .append(&chain, RecordDraft::new(RecordType::Issue, format!("F-{i}")))
                .unwrap();
        }
        let batch = SubmissionBatch::new(chain.clone(), storage.submittable(&chain, n).unwrap());
        (storage, batch)
    }

    struct StuckClock(DateTime<Utc>);

    impl Clock for StuckClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn outcome(id: &str, verdict: RecordVerdict, code: Option<&str>) -> RecordOutcome {
        RecordOutcome {
            correlation_id: id.to_string(),
            verdict,
            code: code.map(str::to_string),
            message: code.map(|c| format!("authority code {c}")),
        }
    }

    fn result(outcome: RemisionOutcome) -> RemisionResult {
        RemisionResult {
            batch_id: BatchId::new(),
            attempts: 1,
            outcome,
        }
    }

    fn states(storage: &MemoryLedgerStorage, batch: &SubmissionBatch) -> Vec<StatusState> {
        batch
            .sequence_ids()
            .into_iter()
            .map(|seq| storage.get(batch.chain(), seq).unwrap().unwrap().state())
            .collect()
    }

    #[test]
    fn test_two_accepted_one_rejected() {
        let (storage, batch) = setup(3);
        // Response order differs from batch order.
        let res = result(RemisionOutcome::Partial {
            confirmation: Some("CSV-9".into()),
            records: vec![
                outcome("F-3", RecordVerdict::Accepted, None),
                outcome("F-2", RecordVerdict::Rejected, Some("1100")),
                outcome("F-1", RecordVerdict::Accepted, None),
            ],
        });

        let report = ReconciliationApplier::new(storage.clone())
            .apply(&batch, &res)
            .unwrap();

        assert_eq!(report.updated(), 3);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(
            states(&storage, &batch),
            vec![
                StatusState::Accepted,
                StatusState::Rejected,
                StatusState::Accepted
            ]
        );
        let rejected = storage.get(batch.chain(), 2).unwrap().unwrap();
        assert_eq!(rejected.status().code.as_deref(), Some("1100"));
        assert_eq!(
            rejected.status().message.as_deref(),
            Some("authority code 1100")
        );
    }

    #[test]
    fn test_status_changes_stamped_by_clock() {
        let (storage, batch) = setup(2);
        let at = DateTime::parse_from_rfc3339("2026-03-02T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let res = result(RemisionOutcome::Success {
            confirmation: Some("CSV-1".into()),
            records: Vec::new(),
        });

        ReconciliationApplier::with_clock(storage.clone(), Arc::new(StuckClock(at)))
            .apply(&batch, &res)
            .unwrap();

        for seq in batch.sequence_ids() {
            let record = storage.get(batch.chain(), seq).unwrap().unwrap();
            assert_eq!(record.state(), StatusState::Accepted);
            assert_eq!(record.status().updated_at, Some(at));
        }
    }

    #[test]
    fn test_partial_leaves_unmatched_pending() {
        let (storage, batch) = setup(3);
        let res = result(RemisionOutcome::Partial {
            confirmation: None,
            records: vec![outcome("F-2", RecordVerdict::Rejected, Some("1100"))],
        });

        let report = ReconciliationApplier::new(storage.clone())
            .apply(&batch, &res)
            .unwrap();

        assert_eq!(report.updated(), 1);
        assert_eq!(report.unmatched, 2);
        assert_eq!(
            states(&storage, &batch),
            vec![
                StatusState::Pending,
                StatusState::Rejected,
                StatusState::Pending
            ]
        );
    }

    #[test]
    fn test_success_accepts_omitted_records() {
        let (storage, batch) = setup(2);
        let res = result(RemisionOutcome::Success {
            confirmation: Some("CSV-1".into()),
            records: vec![outcome("F-1", RecordVerdict::AcceptedWithErrors, Some("2001"))],
        });

        let report = ReconciliationApplier::new(storage.clone())
            .apply(&batch, &res)
            .unwrap();
        assert_eq!(report.accepted, 2);

        let first = storage.get(batch.chain(), 1).unwrap().unwrap();
        assert_eq!(first.status().code.as_deref(), Some("2001"));
        let second = storage.get(batch.chain(), 2).unwrap().unwrap();
        assert_eq!(second.status().code.as_deref(), Some("CSV-1"));
    }

    #[test]
    fn test_permanent_marks_records_error() {
        let (storage, batch) = setup(2);
        let res = result(RemisionOutcome::Permanent {
            status: 400,
            message: "malformed".into(),
        });

        let report = ReconciliationApplier::new(storage.clone())
            .apply(&batch, &res)
            .unwrap();

        assert_eq!(report.errored, 2);
        let record = storage.get(batch.chain(), 1).unwrap().unwrap();
        assert_eq!(record.state(), StatusState::Error);
        assert_eq!(record.status().code.as_deref(), Some("400"));
    }

    #[test]
    fn test_global_failures_touch_nothing() {
        let (storage, batch) = setup(2);
        for res in [
            result(RemisionOutcome::Exhausted {
                last_error: TransportError::Timeout,
            }),
            result(RemisionOutcome::Rejected {
                code: "4102".into(),
                message: "bad signature".into(),
            }),
            result(RemisionOutcome::Cancelled),
        ] {
            let report = ReconciliationApplier::new(storage.clone())
                .apply(&batch, &res)
                .unwrap();
            assert_eq!(report.updated(), 0);
        }
        assert_eq!(
            states(&storage, &batch),
            vec![StatusState::Pending, StatusState::Pending]
        );
    }

    #[test]
    fn test_error_record_is_rearmed() {
        let (storage, batch) = setup(1);
        storage
            .update_status(batch.chain(), 1, AuthorityStatus::error(None, "timeout"))
            .unwrap();

        let res = result(RemisionOutcome::Success {
            confirmation: None,
            records: vec![outcome("F-1", RecordVerdict::Accepted, None)],
        });
        let report = ReconciliationApplier::new(storage.clone())
            .apply(&batch, &res)
            .unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(states(&storage, &batch), vec![StatusState::Accepted]);
    }

    #[test]
    fn test_terminal_record_is_skipped() {
        let (storage, batch) = setup(2);
        storage
            .update_status(batch.chain(), 1, AuthorityStatus::rejected("1100", "bad"))
            .unwrap();

        let res = result(RemisionOutcome::Success {
            confirmation: None,
            records: Vec::new(),
        });
        let report = ReconciliationApplier::new(storage.clone())
            .apply(&batch, &res)
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.accepted, 1);
        assert_eq!(
            states(&storage, &batch),
            vec![StatusState::Rejected, StatusState::Accepted]
        );
    }
}
