//! Tessera Ledger - tamper-evident, append-only ledger core.
//!
//! This crate provides:
//! - Per-(tenant, ledger) hash chains of immutable records
//! - Single-writer appends with atomic commit of record and chain head
//! - Resumable chain verification that pinpoints the first break
//! - The authority-status state machine (the only mutable part of a record)
//! - In-memory and file-backed storage
//!
//! # Security Model
//!
//! Every record stores the hash of its predecessor and its own link hash:
//!
//! ```text
//! link_hash = SHA-256(previous_hash || canonical(record))
//! ```
//!
//! Rewriting any hashed field of any committed record changes its link hash
//! and breaks the chain at that record, which [`ChainVerifier`] reports.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_ledger::{
//!     ChainKey, ChainVerifier, LedgerAppender, LedgerKind, MemoryLedgerStorage, RecordDraft,
//!     RecordType, TenantId,
//! };
//!
//! let storage = Arc::new(MemoryLedgerStorage::new());
//! let appender = LedgerAppender::new(storage.clone());
//! let chain = ChainKey::new(TenantId::new("acme").unwrap(), LedgerKind::Invoices);
//!
//! let draft = RecordDraft::new(RecordType::Issue, "VF-2026-0001")
//!     .with_field("issuer_tax_id", "B12345678")
//!     .with_field("total_amount", "121.00");
//! let record = appender.append(&chain, draft).unwrap();
//! assert_eq!(record.sequence_id(), 1);
//!
//! let result = ChainVerifier::new(storage).verify(&chain, None).unwrap();
//! assert!(result.valid);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod appender;
mod canonical;
mod chain;
mod clock;
mod error;
mod link;
mod record;
mod sealed;
mod status;
mod storage;
mod verifier;

pub use appender::{ChainContext, LedgerAppender};
pub use canonical::CanonicalFormat;
pub use chain::{ChainKey, LedgerKind, TenantId};
pub use clock::{Clock, SystemClock};
pub use error::{LedgerError, LedgerResult};
pub use link::ChainLink;
pub use record::{ChainHead, LedgerRecord, PayloadFields, RecordDraft, RecordType};
pub use sealed::SEALED_PREFIX;
pub use status::{AuthorityStatus, StatusState};
pub use storage::{FileLedgerStorage, LedgerStorage, MemoryLedgerStorage};
pub use verifier::{BreakKind, ChainBreak, ChainIntegrityResult, ChainVerifier};

/// Re-exported so callers can name hashes without depending on the crypto crate.
pub use tessera_crypto::ContentHash;
