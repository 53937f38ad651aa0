//! Mock implementations for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tessera_ledger::Clock;
use tessera_remision::{BatchId, SubmissionRequest, Transport, TransportError};
use tokio::time::Instant;

/// One scripted transport answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// 2xx with this body.
    Body(String),
    /// Non-2xx status, optionally with a `Retry-After` hint.
    Status {
        /// HTTP status code.
        status: u16,
        /// Parsed `Retry-After`.
        retry_after: Option<Duration>,
    },
    /// Connection refused.
    ConnectFailure,
    /// Never answers; the client's per-attempt timeout must fire.
    Hang,
}

impl MockResponse {
    /// Global acceptance without per-record detail.
    #[must_use]
    pub fn accepted() -> Self {
        Self::Body(r#"{"status": "accepted", "confirmation": "MOCK-CSV"}"#.to_string())
    }

    /// HTTP status without a hint.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self::Status {
            status,
            retry_after: None,
        }
    }
}

/// A request as seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// When the attempt started (tokio clock, so paused time is honored).
    pub at: Instant,
    /// Batch submitted.
    pub batch_id: BatchId,
    /// Tenant of the batch.
    pub tenant: String,
    /// Correlation ids in request order.
    pub correlation_ids: Vec<String>,
}

/// Mock implementation of [`Transport`] replaying scripted responses.
///
/// Responses are consumed in order; once the script is empty every attempt
/// gets the fallback response. Uses `std::sync::Mutex` so the builder works
/// without a runtime.
#[derive(Debug, Clone)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    fallback: MockResponse,
}

impl MockTransport {
    /// Create a transport that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            fallback: MockResponse::accepted(),
        }
    }

    /// A transport whose every attempt hangs until timed out.
    #[must_use]
    pub fn always_timeout() -> Self {
        Self::new().with_fallback(MockResponse::Hang)
    }

    /// Queue a response.
    #[must_use]
    pub fn with_response(self, response: MockResponse) -> Self {
        self.queue(response);
        self
    }

    /// Queue a 2xx body.
    #[must_use]
    pub fn with_body(self, body: impl Into<String>) -> Self {
        self.with_response(MockResponse::Body(body.into()))
    }

    /// Answer with `response` once the script is exhausted.
    #[must_use]
    pub fn with_fallback(mut self, response: MockResponse) -> Self {
        self.fallback = response;
        self
    }

    /// Queue a response on a shared transport.
    pub fn queue(&self, response: MockResponse) {
        if let Ok(mut guard) = self.responses.lock() {
            guard.push_back(response);
        }
    }

    /// All captured requests.
    #[must_use]
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of attempts made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|g| g.len()).unwrap_or_default()
    }

    /// Gaps between consecutive attempts.
    #[must_use]
    pub fn gaps(&self) -> Vec<Duration> {
        self.requests()
            .windows(2)
            .map(|w| w[1].at.saturating_duration_since(w[0].at))
            .collect()
    }

    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .ok()
            .and_then(|mut g| g.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &SubmissionRequest) -> Result<Vec<u8>, TransportError> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(CapturedRequest {
                at: Instant::now(),
                batch_id: request.batch_id,
                tenant: request.tenant.clone(),
                correlation_ids: request
                    .records
                    .iter()
                    .map(|r| r.correlation_id.clone())
                    .collect(),
            });
        }

        match self.next_response() {
            MockResponse::Body(body) => Ok(body.into_bytes()),
            MockResponse::Status {
                status,
                retry_after,
            } => Err(TransportError::Status {
                status,
                retry_after,
                body: format!("mock status {status}"),
            }),
            MockResponse::ConnectFailure => {
                Err(TransportError::Connect("mock connection refused".to_string()))
            },
            MockResponse::Hang => {
                std::future::pending::<()>().await;
                Err(TransportError::Timeout)
            },
        }
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// A clock stopped at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        if let Ok(mut guard) = self.now.lock() {
            if let Some(next) = guard.checked_add_signed(delta) {
                *guard = next;
            }
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|g| *g)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{append_invoices, memory_ledger, test_chain};
    use tessera_ledger::LedgerStorage;
    use tessera_remision::{SoftwareInfo, SubmissionBatch};

    fn request() -> SubmissionRequest {
        let (storage, appender) = memory_ledger();
        let chain = test_chain("acme");
        append_invoices(&appender, &chain, 2);
        let batch = SubmissionBatch::new(chain.clone(), storage.submittable(&chain, 10).unwrap());
        SubmissionRequest::from_batch(&batch, &SoftwareInfo::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_then_fallback() {
        let transport = MockTransport::new()
            .with_response(MockResponse::status(503))
            .with_response(MockResponse::ConnectFailure);
        let request = request();

        assert!(matches!(
            transport.send(&request).await,
            Err(TransportError::Status { status: 503, .. })
        ));
        assert!(matches!(
            transport.send(&request).await,
            Err(TransportError::Connect(_))
        ));
        assert!(transport.send(&request).await.is_ok());

        assert_eq!(transport.call_count(), 3);
        assert_eq!(
            transport.requests()[0].correlation_ids,
            vec!["INV-0001", "INV-0002"]
        );
    }

    #[test]
    fn test_fixed_clock_advances() {
        let start = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FixedClock::new(start);
        clock.advance(TimeDelta::seconds(90));
        assert_eq!(
            Some(clock.now()),
            start.checked_add_signed(TimeDelta::seconds(90))
        );
    }
}
