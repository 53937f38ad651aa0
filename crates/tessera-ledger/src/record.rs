//! Ledger records.
//!
//! A [`LedgerRecord`] can only be produced by sealing a [`RecordDraft`]
//! inside the appender. No setter exists for any hashed field; the authority
//! status is the only mutable part and changes only through
//! [`LedgerRecord::transition_status`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_crypto::ContentHash;
use tracing::error;

use crate::canonical::CanonicalFormat;
use crate::chain::ChainKey;
use crate::error::{LedgerError, LedgerResult};
use crate::link::ChainLink;
use crate::status::{AuthorityStatus, StatusState};

/// Kind of a ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordType {
    /// A newly issued invoice.
    Issue,
    /// Cancellation of a previously issued invoice.
    Cancel,
    /// Rectifying invoice.
    Rectify {
        /// Correlation id of the corrected record.
        corrects: String,
    },
    /// Free-form audit event.
    Event {
        /// Event kind, e.g. `message.sent`.
        kind: String,
    },
}

impl RecordType {
    /// Short label for logs and listings.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Issue => "issue",
            Self::Cancel => "cancel",
            Self::Rectify { .. } => "rectify",
            Self::Event { kind } => kind,
        }
    }
}

/// Business fields hashed into the chain, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadFields(BTreeMap<String, String>);

impl PayloadFields {
    /// Create an empty field set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PayloadFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Content of a record before it is sealed into a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub(crate) record_type: RecordType,
    pub(crate) correlation_id: String,
    pub(crate) fields: PayloadFields,
}

impl RecordDraft {
    /// Start a draft.
    ///
    /// `correlation_id` is the identifier the authority echoes back in its
    /// per-record outcomes (the invoice number, or a message id).
    #[must_use]
    pub fn new(record_type: RecordType, correlation_id: impl Into<String>) -> Self {
        Self {
            record_type,
            correlation_id: correlation_id.into(),
            fields: PayloadFields::new(),
        }
    }

    /// Add a business field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key, value);
        self
    }

    /// Replace all fields.
    #[must_use]
    pub fn with_fields(mut self, fields: PayloadFields) -> Self {
        self.fields = fields;
        self
    }

    /// The record type.
    #[must_use]
    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// The correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// The fields collected so far.
    #[must_use]
    pub fn fields(&self) -> &PayloadFields {
        &self.fields
    }
}

/// Sequence id and link hash of the last committed record of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Sequence id of the last record.
    pub sequence_id: u64,
    /// Link hash of the last record.
    pub link_hash: ContentHash,
}

/// A committed ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    chain: ChainKey,
    sequence_id: u64,
    record_type: RecordType,
    correlation_id: String,
    fields: PayloadFields,
    created_at: DateTime<Utc>,
    format: CanonicalFormat,
    previous_hash: ContentHash,
    link_hash: ContentHash,
    #[serde(default)]
    status: AuthorityStatus,
}

impl LedgerRecord {
    /// Seal a draft onto `previous_hash` at `sequence_id`.
    pub(crate) fn seal(
        chain: ChainKey,
        sequence_id: u64,
        draft: RecordDraft,
        created_at: DateTime<Utc>,
        previous_hash: ContentHash,
    ) -> LedgerResult<Self> {
        if draft.correlation_id.trim().is_empty() {
            return Err(LedgerError::InvalidRecord(
                "correlation id must not be empty".to_string(),
            ));
        }
        if sequence_id == 0 {
            return Err(LedgerError::InvalidRecord(
                "sequence ids start at 1".to_string(),
            ));
        }

        let format = CanonicalFormat::CURRENT;
        let canonical = format.encode(
            sequence_id,
            &draft.record_type,
            &draft.correlation_id,
            &created_at,
            &draft.fields,
        )?;
        let link_hash = ChainLink::compute(&previous_hash, &canonical);
        if link_hash == ChainLink::GENESIS {
            return Err(LedgerError::InvalidRecord(
                "link hash collides with the chain sentinel".to_string(),
            ));
        }

        Ok(Self {
            chain,
            sequence_id,
            record_type: draft.record_type,
            correlation_id: draft.correlation_id,
            fields: draft.fields,
            created_at,
            format,
            previous_hash,
            link_hash,
            status: AuthorityStatus::pending(),
        })
    }

    /// Re-encode the hashed content under the format this record was written with.
    ///
    /// # Errors
    ///
    /// Returns an error if the content no longer fits the format's limits.
    pub fn canonical_bytes(&self) -> LedgerResult<Vec<u8>> {
        self.format.encode(
            self.sequence_id,
            &self.record_type,
            &self.correlation_id,
            &self.created_at,
            &self.fields,
        )
    }

    /// Apply a status change permitted by the state machine.
    ///
    /// Returns the previous status. Illegal transitions are logged and
    /// refused; the record is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::IllegalTransition`] if the state machine does
    /// not allow moving from the current state to `next.state`.
    pub fn transition_status(&mut self, next: AuthorityStatus) -> LedgerResult<AuthorityStatus> {
        let from = self.status.state;
        if !from.can_transition_to(next.state) {
            error!(
                chain = %self.chain,
                sequence_id = self.sequence_id,
                from = %from,
                to = %next.state,
                "Refused illegal authority status transition"
            );
            return Err(LedgerError::IllegalTransition {
                chain: self.chain.to_string(),
                sequence_id: self.sequence_id,
                from,
                to: next.state,
            });
        }
        Ok(std::mem::replace(&mut self.status, next))
    }

    /// Chain this record belongs to.
    #[must_use]
    pub fn chain(&self) -> &ChainKey {
        &self.chain
    }

    /// Position in the chain, starting at 1.
    #[must_use]
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Record kind.
    #[must_use]
    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// Identifier matched against authority outcomes.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Hashed business fields.
    #[must_use]
    pub fn fields(&self) -> &PayloadFields {
        &self.fields
    }

    /// Creation time (microsecond precision).
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Canonical format used for the link hash.
    #[must_use]
    pub fn format(&self) -> CanonicalFormat {
        self.format
    }

    /// Link hash of the predecessor, or the sentinel.
    #[must_use]
    pub fn previous_hash(&self) -> &ContentHash {
        &self.previous_hash
    }

    /// This record's link hash.
    #[must_use]
    pub fn link_hash(&self) -> &ContentHash {
        &self.link_hash
    }

    /// Current authority status.
    #[must_use]
    pub fn status(&self) -> &AuthorityStatus {
        &self.status
    }

    /// Shorthand for `status().state`.
    #[must_use]
    pub fn state(&self) -> StatusState {
        self.status.state
    }

    /// Chain head pointing at this record.
    #[must_use]
    pub fn head(&self) -> ChainHead {
        ChainHead {
            sequence_id: self.sequence_id,
            link_hash: self.link_hash,
        }
    }

    /// Whether every hashed field matches `other`.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.chain == other.chain
            && self.sequence_id == other.sequence_id
            && self.record_type == other.record_type
            && self.correlation_id == other.correlation_id
            && self.fields == other.fields
            && self.created_at == other.created_at
            && self.format == other.format
            && self.previous_hash == other.previous_hash
            && self.link_hash == other.link_hash
    }
}
