//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_ledger::prelude::*;` to import all essential types.

// Errors
pub use crate::{LedgerError, LedgerResult};

// Chains and records
pub use crate::{
    AuthorityStatus, ChainHead, ChainKey, LedgerKind, LedgerRecord, PayloadFields, RecordDraft,
    RecordType, StatusState, TenantId,
};

// Append and verification
pub use crate::{ChainIntegrityResult, ChainLink, ChainVerifier, LedgerAppender};

// Storage
pub use crate::{FileLedgerStorage, LedgerStorage, MemoryLedgerStorage};

// Hashing
pub use crate::ContentHash;
