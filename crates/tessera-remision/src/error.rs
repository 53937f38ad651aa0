//! Submission error types.

use std::time::Duration;

use thiserror::Error;

use crate::batch::{BatchId, BatchStatus};

/// Failure of a single transport attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The attempt did not complete within the per-attempt timeout.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The authority answered with a non-success HTTP status.
    #[error("authority returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided `Retry-After` hint.
        retry_after: Option<Duration>,
        /// Response body (truncated).
        body: String,
    },

    /// The request could not be built or encoded.
    #[error("invalid request: {0}")]
    Request(String),
}

impl TransportError {
    /// Whether the failure is worth retrying: timeouts, connection
    /// failures, rate limiting (429) and server errors (5xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Request(_) => false,
        }
    }

    /// The server's retry hint, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status, if the failure carried one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors that can occur while batching, submitting or reconciling.
#[derive(Debug, Error)]
pub enum RemisionError {
    /// Ledger storage error.
    #[error("ledger error: {0}")]
    Ledger(#[from] tessera_ledger::LedgerError),

    /// A batch was asked to move to a status its lifecycle does not allow.
    #[error("batch {batch_id} cannot move from {from} to {to}")]
    InvalidBatchState {
        /// Batch concerned.
        batch_id: BatchId,
        /// Current status.
        from: BatchStatus,
        /// Requested status.
        to: BatchStatus,
    },

    /// The authority's response could not be parsed.
    #[error("invalid authority response: {0}")]
    InvalidResponse(String),

    /// Client-side defect in the submission (non-429 4xx). Not retried.
    #[error("permanent submission error (HTTP {status}): {message}")]
    Permanent {
        /// HTTP status code.
        status: u16,
        /// Authority message.
        message: String,
    },

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background task failed.
    #[error("task error: {0}")]
    Task(String),
}

/// Result type for submission operations.
pub type SubmissionResult<T> = Result<T, RemisionError>;
