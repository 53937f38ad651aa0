//! Tessera Remision - submission of ledger records to an external authority.
//!
//! This crate provides:
//! - [`SubmissionBatcher`]: selects the oldest unsent records of a chain
//! - [`RemoteSubmissionClient`]: submits a batch with bounded exponential
//!   backoff, honoring `Retry-After`, and classifies the authority's answer
//! - [`ReconciliationApplier`]: writes per-record outcomes back as authority
//!   status, matched by correlation id
//! - [`RemisionService`]: runs the cycle per chain behind a circuit breaker
//!   and flow control
//!
//! Submission never touches the hash chain. Only the authority status of a
//! record changes, and only along the status state machine.
//!
//! # Failure classes
//!
//! | Failure | Retried | Batch ends | Records |
//! |---------|---------|------------|---------|
//! | timeout, connect, 429, 5xx | yes | `Queued` when exhausted | untouched |
//! | other 4xx | no | `Failed` | `Error` |
//! | global rejection | no | `Failed` | untouched |

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod applier;
mod batch;
mod batcher;
mod circuit;
mod client;
mod error;
mod flow;
mod protocol;
mod retry;
mod service;
mod transport;

pub use applier::{ReconciliationApplier, ReconciliationReport};
pub use batch::{BatchId, BatchStatus, SubmissionBatch};
pub use batcher::SubmissionBatcher;
pub use circuit::CircuitBreaker;
pub use client::{RemisionOutcome, RemisionResult, RemoteSubmissionClient};
pub use error::{RemisionError, SubmissionResult, TransportError};
pub use flow::FlowControl;
pub use protocol::{
    AuthorityResponse, JsonResponseParser, RecordOutcome, RecordVerdict, ResponseParser,
    SoftwareInfo, SubmissionRequest, WireRecord,
};
pub use retry::RetryPolicy;
pub use service::{CycleReport, DEFAULT_MAX_BATCH_SIZE, RemisionService, SkipReason};
pub use transport::{HttpTransport, Transport};
