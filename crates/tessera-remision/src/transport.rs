//! Network transport to the authority.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderValue, RETRY_AFTER};
use tracing::debug;

use crate::error::{RemisionError, SubmissionResult, TransportError};
use crate::protocol::SubmissionRequest;

/// Longest response body kept in an error.
const MAX_ERROR_BODY: usize = 512;

/// Sends one submission and returns the raw body of a 2xx response.
///
/// Implementations perform exactly one attempt; retrying is the client's
/// job. Non-2xx answers are reported as [`TransportError::Status`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one attempt.
    async fn send(&self, request: &SubmissionRequest) -> Result<Vec<u8>, TransportError>;
}

/// HTTPS transport posting the request as JSON.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for `endpoint`, authenticating with a bearer
    /// `token` when given.
    ///
    /// # Errors
    ///
    /// Returns [`RemisionError::Config`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        request_timeout: Duration,
    ) -> SubmissionResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("tessera/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemisionError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }

    /// Target endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &SubmissionRequest) -> Result<Vec<u8>, TransportError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(token) = &self.token {
            let mut auth = HeaderValue::try_from(format!("Bearer {token}"))
                .map_err(|e| TransportError::Request(format!("invalid token characters: {e}")))?;
            auth.set_sensitive(true);
            builder = builder.header(AUTHORIZATION, auth);
        }

        debug!(
            endpoint = %self.endpoint,
            batch_id = %request.batch_id,
            records = request.records.len(),
            "Posting submission"
        );
        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        if status.is_success() {
            Ok(body.to_vec())
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                retry_after,
                body: String::from_utf8_lossy(&body)
                    .chars()
                    .take(MAX_ERROR_BODY)
                    .collect(),
            })
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_builder() {
        TransportError::Request(e.to_string())
    } else {
        TransportError::Connect(e.to_string())
    }
}

/// Parse a `Retry-After` value: delta seconds or an HTTP date.
pub(crate) fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        at.with_timezone(&Utc)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}
