//! Submission client: retries, timeouts and outcome classification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batch::{BatchId, BatchStatus, SubmissionBatch};
use crate::error::{RemisionError, SubmissionResult, TransportError};
use crate::protocol::{
    AuthorityResponse, JsonResponseParser, RecordOutcome, ResponseParser, SoftwareInfo,
    SubmissionRequest,
};
use crate::retry::RetryPolicy;
use crate::transport::Transport;

/// Classified result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemisionOutcome {
    /// Every record accepted.
    Success {
        /// Authority confirmation code.
        confirmation: Option<String>,
        /// Per-record detail as returned.
        records: Vec<RecordOutcome>,
    },
    /// Some records accepted, some rejected or not reported.
    Partial {
        /// Authority confirmation code.
        confirmation: Option<String>,
        /// Per-record detail as returned.
        records: Vec<RecordOutcome>,
    },
    /// The submission was refused before per-record evaluation.
    Rejected {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// Non-retryable client error (4xx other than 429).
    Permanent {
        /// HTTP status code.
        status: u16,
        /// Error detail.
        message: String,
    },
    /// Every attempt failed transiently.
    Exhausted {
        /// Error of the last attempt.
        last_error: TransportError,
    },
    /// The submission was cancelled.
    Cancelled,
}

impl RemisionOutcome {
    /// Short name for logs and listings.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Partial { .. } => "partial",
            Self::Rejected { .. } => "rejected",
            Self::Permanent { .. } => "permanent",
            Self::Exhausted { .. } => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }

    fn batch_status(&self) -> BatchStatus {
        match self {
            Self::Success { .. } => BatchStatus::Completed,
            Self::Partial { .. } => BatchStatus::PartiallyFailed,
            Self::Rejected { .. } | Self::Permanent { .. } => BatchStatus::Failed,
            Self::Exhausted { .. } | Self::Cancelled => BatchStatus::Queued,
        }
    }
}

/// What [`RemoteSubmissionClient::submit`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemisionResult {
    /// Batch that was submitted.
    pub batch_id: BatchId,
    /// Transport attempts made.
    pub attempts: u32,
    /// Classified outcome.
    pub outcome: RemisionOutcome,
}

impl RemisionResult {
    /// Whether the records reached the authority and were evaluated.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            RemisionOutcome::Success { .. } | RemisionOutcome::Partial { .. }
        )
    }

    /// Whether the submission failed (rejected, refused or exhausted).
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            RemisionOutcome::Rejected { .. }
                | RemisionOutcome::Permanent { .. }
                | RemisionOutcome::Exhausted { .. }
        )
    }

    /// Surface a permanent submission error as [`RemisionError::Permanent`].
    ///
    /// # Errors
    ///
    /// Returns [`RemisionError::Permanent`] for a permanent outcome.
    pub fn into_checked(self) -> SubmissionResult<Self> {
        match self.outcome {
            RemisionOutcome::Permanent { status, message } => {
                Err(RemisionError::Permanent { status, message })
            },
            _ => Ok(self),
        }
    }
}

/// Submits batches to the authority.
pub struct RemoteSubmissionClient {
    transport: Arc<dyn Transport>,
    parser: Arc<dyn ResponseParser>,
    policy: RetryPolicy,
    request_timeout: Duration,
    software: SoftwareInfo,
}

impl RemoteSubmissionClient {
    /// Create a client with the JSON response parser.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, request_timeout: Duration) -> Self {
        Self {
            transport,
            parser: Arc::new(JsonResponseParser),
            policy,
            request_timeout,
            software: SoftwareInfo::default(),
        }
    }

    /// Use another response parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn ResponseParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Identify the submitting software.
    #[must_use]
    pub fn with_software(mut self, software: SoftwareInfo) -> Self {
        self.software = software;
        self
    }

    /// The retry policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Submit `batch`.
    ///
    /// # Errors
    ///
    /// Returns [`RemisionError::InvalidBatchState`] unless the batch is
    /// `Queued`. Network failures are not errors; they are classified into
    /// the returned outcome.
    pub async fn submit(&self, batch: &mut SubmissionBatch) -> SubmissionResult<RemisionResult> {
        self.submit_with_cancel(batch, &CancellationToken::new())
            .await
    }

    /// Submit `batch`, giving up when `cancel` fires.
    ///
    /// Each attempt is bounded by the request timeout; a timeout counts as a
    /// transient failure. Cancellation, like exhausted retries, returns the
    /// batch to `Queued`, so it is never left `Sending`.
    ///
    /// # Errors
    ///
    /// Returns [`RemisionError::InvalidBatchState`] unless the batch is `Queued`.
    pub async fn submit_with_cancel(
        &self,
        batch: &mut SubmissionBatch,
        cancel: &CancellationToken,
    ) -> SubmissionResult<RemisionResult> {
        batch.transition(BatchStatus::Sending)?;
        let request = SubmissionRequest::from_batch(batch, &self.software);
        let mut attempts = 0u32;

        let outcome = if batch.is_empty() {
            RemisionOutcome::Success {
                confirmation: None,
                records: Vec::new(),
            }
        } else {
            loop {
                attempts = batch.record_attempt();
                let sent = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break RemisionOutcome::Cancelled,
                    sent = tokio::time::timeout(self.request_timeout, self.transport.send(&request)) => {
                        sent.unwrap_or(Err(TransportError::Timeout))
                    },
                };

                match sent {
                    Ok(body) => break self.classify(batch, &body),
                    Err(e) if e.is_transient() => {
                        if !self.policy.allows_retry_after(attempts) {
                            error!(
                                batch_id = %batch.id(),
                                chain = %batch.chain(),
                                attempts,
                                error = %e,
                                "Submission retries exhausted; batch stays queued"
                            );
                            break RemisionOutcome::Exhausted { last_error: e };
                        }
                        let delay = self.policy.delay(attempts, e.retry_after());
                        warn!(
                            batch_id = %batch.id(),
                            chain = %batch.chain(),
                            attempt = attempts,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %e,
                            "Transient submission failure, backing off"
                        );
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break RemisionOutcome::Cancelled,
                            () = tokio::time::sleep(delay) => {},
                        }
                    },
                    Err(e) => {
                        error!(
                            batch_id = %batch.id(),
                            chain = %batch.chain(),
                            status = e.status(),
                            error = %e,
                            "Permanent submission error; manual intervention required"
                        );
                        break RemisionOutcome::Permanent {
                            status: e.status().unwrap_or_default(),
                            message: e.to_string(),
                        };
                    },
                }
            }
        };

        let (accepted, rejected) = tally(batch, &outcome);
        batch.set_counts(accepted, rejected);
        batch.transition(outcome.batch_status())?;

        info!(
            batch_id = %batch.id(),
            chain = %batch.chain(),
            outcome = outcome.label(),
            attempts,
            accepted,
            rejected,
            status = %batch.status(),
            "Submission finished"
        );
        Ok(RemisionResult {
            batch_id: batch.id(),
            attempts,
            outcome,
        })
    }

    fn classify(&self, batch: &SubmissionBatch, body: &[u8]) -> RemisionOutcome {
        let response = match self.parser.parse(body) {
            Ok(response) => response,
            Err(e) => {
                error!(batch_id = %batch.id(), error = %e, "Unparseable authority response");
                return RemisionOutcome::Rejected {
                    code: "invalid_response".to_string(),
                    message: e.to_string(),
                };
            },
        };

        match response {
            AuthorityResponse::Rejected { code, message } => {
                RemisionOutcome::Rejected { code, message }
            },
            AuthorityResponse::Accepted {
                confirmation,
                records,
            } => {
                if records.iter().any(|r| !r.verdict.is_accepted()) {
                    RemisionOutcome::Partial {
                        confirmation,
                        records,
                    }
                } else {
                    RemisionOutcome::Success {
                        confirmation,
                        records,
                    }
                }
            },
            AuthorityResponse::PartiallyAccepted {
                confirmation,
                records,
            } => RemisionOutcome::Partial {
                confirmation,
                records,
            },
        }
    }
}

impl std::fmt::Debug for RemoteSubmissionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSubmissionClient")
            .field("policy", &self.policy)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Accepted and rejected record counts of `batch` under `outcome`.
fn tally(batch: &SubmissionBatch, outcome: &RemisionOutcome) -> (usize, usize) {
    let (records, unmatched_accepted) = match outcome {
        RemisionOutcome::Success { records, .. } => (records, true),
        RemisionOutcome::Partial { records, .. } => (records, false),
        _ => return (0, 0),
    };
    let by_id: HashMap<&str, &RecordOutcome> = records
        .iter()
        .map(|r| (r.correlation_id.as_str(), r))
        .collect();

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    for record in batch.records() {
        match by_id.get(record.correlation_id()) {
            Some(o) if o.verdict.is_accepted() => accepted = accepted.saturating_add(1),
            Some(_) => rejected = rejected.saturating_add(1),
            None if unmatched_accepted => accepted = accepted.saturating_add(1),
            None => {},
        }
    }
    (accepted, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tessera_ledger::{
        ChainKey, LedgerAppender, LedgerKind, LedgerStorage, MemoryLedgerStorage, RecordDraft,
        RecordType, TenantId,
    };
    use tokio::time::Instant;

    /// Replays scripted answers and records when each attempt started.
    #[derive(Default)]
    struct Scripted {
        answers: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
        calls: Mutex<Vec<Instant>>,
        hang: bool,
    }

    impl Scripted {
        fn new(answers: Vec<Result<Vec<u8>, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                ..Self::default()
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                hang: true,
                ..Self::default()
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, _request: &SubmissionRequest) -> Result<Vec<u8>, TransportError> {
            self.calls.lock().unwrap().push(Instant::now());
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Connect("script exhausted".into())))
        }
    }

    fn status(code: u16) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Status {
            status: code,
            retry_after: None,
            body: "nope".into(),
        })
    }

    fn body(json: &str) -> Result<Vec<u8>, TransportError> {
        Ok(json.as_bytes().to_vec())
    }

    fn batch(n: usize) -> SubmissionBatch {
        let storage = Arc::new(MemoryLedgerStorage::new());
        let chain = ChainKey::new(TenantId::new("acme").unwrap(), LedgerKind::Invoices);
        let appender = LedgerAppender::new(storage.clone());
        for i in 1..=n {
            appender
                .append(&chain, RecordDraft::new(RecordType::Issue, format!("F-{i}")))
                .unwrap();
        }
        SubmissionBatch::new(chain.clone(), storage.submittable(&chain, n).unwrap())
    }

    fn client(transport: Arc<dyn Transport>, attempts: u32) -> RemoteSubmissionClient {
        RemoteSubmissionClient::new(
            transport,
            RetryPolicy::new(attempts, Duration::from_secs(1), Duration::from_secs(60)),
            Duration::from_secs(10),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_completes_batch() {
        let transport = Scripted::new(vec![body(r#"{"status": "accepted", "confirmation": "CSV-1"}"#)]);
        let mut batch = batch(2);
        let result = client(transport, 3).submit(&mut batch).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
        assert_eq!(batch.status(), BatchStatus::Completed);
        assert_eq!(batch.accepted_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let transport = Scripted::new(vec![
            status(503),
            Err(TransportError::Connect("refused".into())),
            body(r#"{"status": "accepted"}"#),
        ]);
        let mut batch = batch(1);
        let result = client(transport.clone(), 5).submit(&mut batch).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        let times = transport.call_times();
        assert_eq!(times[1].saturating_duration_since(times[0]), Duration::from_secs(1));
        assert_eq!(times[2].saturating_duration_since(times[1]), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_leaves_batch_queued() {
        let transport = Scripted::new(vec![status(500), status(502), status(429)]);
        let mut batch = batch(1);
        let result = client(transport, 3).submit(&mut batch).await.unwrap();

        assert!(result.is_failure());
        assert_eq!(result.attempts, 3);
        assert!(matches!(result.outcome, RemisionOutcome::Exhausted { .. }));
        assert_eq!(batch.status(), BatchStatus::Queued);
        assert_eq!(batch.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_as_transient() {
        let transport = Scripted::hanging();
        let mut batch = batch(1);
        let result = client(transport.clone(), 2).submit(&mut batch).await.unwrap();

        assert_eq!(
            result.outcome,
            RemisionOutcome::Exhausted {
                last_error: TransportError::Timeout
            }
        );
        let times = transport.call_times();
        assert_eq!(times.len(), 2);
        // 10s timeout plus 1s backoff.
        assert_eq!(times[1].saturating_duration_since(times[0]), Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_is_honored() {
        let transport = Scripted::new(vec![
            Err(TransportError::Status {
                status: 429,
                retry_after: Some(Duration::from_secs(45)),
                body: String::new(),
            }),
            body(r#"{"status": "accepted"}"#),
        ]);
        let mut batch = batch(1);
        client(transport.clone(), 3).submit(&mut batch).await.unwrap();

        let times = transport.call_times();
        assert_eq!(times[1].saturating_duration_since(times[0]), Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hostile_retry_after_is_capped() {
        let transport = Scripted::new(vec![
            Err(TransportError::Status {
                status: 503,
                retry_after: Some(Duration::from_secs(604_800)),
                body: String::new(),
            }),
            body(r#"{"status": "accepted"}"#),
        ]);
        let mut batch = batch(1);
        client(transport.clone(), 3).submit(&mut batch).await.unwrap();

        let times = transport.call_times();
        assert_eq!(times[1].saturating_duration_since(times[0]), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried() {
        let transport = Scripted::new(vec![status(400), body(r#"{"status": "accepted"}"#)]);
        let mut batch = batch(1);
        let result = client(transport.clone(), 5).submit(&mut batch).await.unwrap();

        assert_eq!(result.attempts, 1);
        assert!(matches!(
            result.outcome,
            RemisionOutcome::Permanent { status: 400, .. }
        ));
        assert_eq!(batch.status(), BatchStatus::Failed);
        assert_eq!(transport.call_times().len(), 1);
        assert!(matches!(
            result.into_checked(),
            Err(RemisionError::Permanent { status: 400, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_classification() {
        let transport = Scripted::new(vec![body(
            r#"{"status": "partially_accepted", "records": [
                {"correlation_id": "F-3", "status": "accepted"},
                {"correlation_id": "F-1", "status": "rejected", "code": "1100"},
                {"correlation_id": "F-2", "status": "accepted_with_errors"}
            ]}"#,
        )]);
        let mut batch = batch(3);
        let result = client(transport, 1).submit(&mut batch).await.unwrap();

        assert!(matches!(result.outcome, RemisionOutcome::Partial { .. }));
        assert_eq!(batch.status(), BatchStatus::PartiallyFailed);
        assert_eq!(batch.accepted_count(), 2);
        assert_eq!(batch.rejected_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_rejection_fails_batch() {
        let transport = Scripted::new(vec![body(
            r#"{"status": "rejected", "code": "4102", "message": "bad signature"}"#,
        )]);
        let mut batch = batch(2);
        let result = client(transport, 3).submit(&mut batch).await.unwrap();

        assert!(result.is_failure());
        assert_eq!(batch.status(), BatchStatus::Failed);
        assert_eq!(batch.accepted_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_requeues() {
        let transport = Scripted::new(vec![status(503), status(503)]);
        let mut batch = batch(1);
        let cancel = CancellationToken::new();
        let client = client(transport, 5);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });
        let result = client.submit_with_cancel(&mut batch, &cancel).await.unwrap();

        assert_eq!(result.outcome, RemisionOutcome::Cancelled);
        assert_eq!(batch.status(), BatchStatus::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_requires_queued_batch() {
        let transport = Scripted::new(vec![body(r#"{"status": "accepted"}"#)]);
        let client = client(transport, 1);
        let mut batch = batch(1);
        client.submit(&mut batch).await.unwrap();
        assert!(matches!(
            client.submit(&mut batch).await,
            Err(RemisionError::InvalidBatchState { .. })
        ));
    }
}
