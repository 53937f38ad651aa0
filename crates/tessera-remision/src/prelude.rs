//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_remision::prelude::*;` to import all essential types.

// Errors
pub use crate::{RemisionError, SubmissionResult, TransportError};

// Batching and submission
pub use crate::{
    BatchStatus, RemisionOutcome, RemisionResult, RemoteSubmissionClient, RetryPolicy,
    SubmissionBatch, SubmissionBatcher,
};

// Reconciliation
pub use crate::{ReconciliationApplier, ReconciliationReport};

// Orchestration
pub use crate::{CycleReport, RemisionService, SkipReason};

// Transport
pub use crate::{HttpTransport, Transport};
