//! Ledger error types.

use thiserror::Error;

use crate::status::StatusState;

/// Errors that can occur in the ledger core.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("record {sequence_id} not found in chain {chain}")]
    RecordNotFound {
        /// Chain that was searched.
        chain: String,
        /// Missing sequence id.
        sequence_id: u64,
    },

    /// The chain head moved, or a record would not extend the current head.
    ///
    /// Raised when two writers race on one chain or a caller tries to
    /// overwrite an existing sequence id.
    #[error("append conflict on chain {chain}: {reason}")]
    AppendConflict {
        /// Chain the append targeted.
        chain: String,
        /// What did not line up.
        reason: String,
    },

    /// Chain integrity violation.
    #[error(
        "chain break in {chain} at record {sequence_id}: expected {expected}, found {actual}"
    )]
    ChainBreak {
        /// Chain where the break was found.
        chain: String,
        /// First record that failed verification.
        sequence_id: u64,
        /// Expected hash (hex).
        expected: String,
        /// Hash actually found (hex).
        actual: String,
    },

    /// Authority status transition not permitted by the state machine.
    #[error("illegal status transition for record {sequence_id} in {chain}: {from} -> {to}")]
    IllegalTransition {
        /// Chain of the record.
        chain: String,
        /// Record whose status was to change.
        sequence_id: u64,
        /// Current state.
        from: StatusState,
        /// Requested state.
        to: StatusState,
    },

    /// Invalid identifier or record content.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] tessera_crypto::CryptoError),
}

impl LedgerError {
    pub(crate) fn storage(e: impl std::fmt::Display) -> Self {
        Self::Storage(e.to_string())
    }

    pub(crate) fn serialization(e: impl std::fmt::Display) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
