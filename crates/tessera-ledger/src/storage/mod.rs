//! Ledger persistence.
//!
//! [`LedgerStorage`] is the persistence contract the appender, verifier and
//! reconciliation layers are written against. Two backends ship with the
//! crate:
//!
//! - [`MemoryLedgerStorage`]: ordered in-memory chains, for tests and
//!   embedding.
//! - [`FileLedgerStorage`]: one JSON-lines file per chain plus a status
//!   journal, `fsync`ed before a commit becomes visible.

mod file;
mod memory;

pub use file::FileLedgerStorage;
pub use memory::MemoryLedgerStorage;

use crate::chain::ChainKey;
use crate::error::{LedgerError, LedgerResult};
use crate::link::ChainLink;
use crate::record::{ChainHead, LedgerRecord};
use crate::status::AuthorityStatus;

/// Page size used by [`LedgerStorage::submittable`].
const SCAN_PAGE: usize = 256;

/// Storage backend for ledger chains.
///
/// Implementations must guarantee:
/// - `append` commits the record and advances the chain head as one unit;
///   a failed append leaves nothing visible.
/// - Readers never observe a record whose commit is still in flight.
/// - Hashed fields of a committed record are never rewritten. The only
///   mutation is [`update_status`](Self::update_status), which enforces the
///   status state machine.
pub trait LedgerStorage: Send + Sync {
    /// Last committed record of a chain, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn head(&self, chain: &ChainKey) -> LedgerResult<Option<ChainHead>>;

    /// Commit `record` on top of `expected_head`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AppendConflict`] if the chain head is no longer
    /// `expected_head`, the sequence id is not the next one, the previous
    /// hash does not match the head, or the sequence id already exists.
    /// Returns [`LedgerError::Storage`] if the commit fails, in which case
    /// nothing was committed.
    fn append(&self, record: LedgerRecord, expected_head: Option<ChainHead>) -> LedgerResult<()>;

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, chain: &ChainKey, sequence_id: u64) -> LedgerResult<Option<LedgerRecord>>;

    /// Records with `from <= sequence_id <= to` in ascending order, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn range(
        &self,
        chain: &ChainKey,
        from: u64,
        to: Option<u64>,
        limit: usize,
    ) -> LedgerResult<Vec<LedgerRecord>>;

    /// Change the authority status of a record. Returns the previous status.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::RecordNotFound`] for an unknown record and
    /// [`LedgerError::IllegalTransition`] if the state machine forbids the
    /// change; the stored status is left untouched in both cases.
    fn update_status(
        &self,
        chain: &ChainKey,
        sequence_id: u64,
        next: AuthorityStatus,
    ) -> LedgerResult<AuthorityStatus>;

    /// All chains with at least one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn chains(&self) -> LedgerResult<Vec<ChainKey>>;

    /// Number of records in a chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn count(&self, chain: &ChainKey) -> LedgerResult<u64>;

    /// Oldest records that are `Pending` or `Error`, in sequence order, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn submittable(&self, chain: &ChainKey, limit: usize) -> LedgerResult<Vec<LedgerRecord>> {
        let mut selected = Vec::new();
        let mut from = 1u64;
        while selected.len() < limit {
            let page = self.range(chain, from, None, SCAN_PAGE)?;
            let Some(last) = page.last() else {
                break;
            };
            let Some(next) = last.sequence_id().checked_add(1) else {
                break;
            };
            from = next;
            let exhausted = page.len() < SCAN_PAGE;
            let remaining = limit.saturating_sub(selected.len());
            selected.extend(
                page.into_iter()
                    .filter(|r| r.state().is_submittable())
                    .take(remaining),
            );
            if exhausted {
                break;
            }
        }
        Ok(selected)
    }
}

/// Check that `record` extends `current` and that the caller saw `current`.
pub(crate) fn check_append(
    chain: &ChainKey,
    current: Option<ChainHead>,
    record: &LedgerRecord,
    expected_head: Option<ChainHead>,
) -> LedgerResult<()> {
    let conflict = |reason: String| LedgerError::AppendConflict {
        chain: chain.to_string(),
        reason,
    };

    if record.chain() != chain {
        return Err(conflict(format!(
            "record belongs to chain {}",
            record.chain()
        )));
    }
    if current != expected_head {
        return Err(conflict(format!(
            "head moved: expected {:?}, found {:?}",
            expected_head.map(|h| h.sequence_id),
            current.map(|h| h.sequence_id)
        )));
    }

    let (next_sequence, previous_hash) = match current {
        Some(head) => (
            head.sequence_id
                .checked_add(1)
                .ok_or_else(|| conflict("sequence id space exhausted".to_string()))?,
            head.link_hash,
        ),
        None => (1, ChainLink::GENESIS),
    };
    if record.sequence_id() != next_sequence {
        return Err(conflict(format!(
            "sequence id {} does not follow head (next is {next_sequence})",
            record.sequence_id()
        )));
    }
    if record.previous_hash() != &previous_hash {
        return Err(conflict(format!(
            "previous hash {} does not match head {}",
            record.previous_hash().short(),
            previous_hash.short()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{LedgerKind, TenantId};
    use crate::record::{RecordDraft, RecordType};
    use chrono::Utc;

    fn chain() -> ChainKey {
        ChainKey::new(TenantId::new("acme").unwrap(), LedgerKind::Invoices)
    }

    fn record(seq: u64, prev: tessera_crypto::ContentHash) -> LedgerRecord {
        let draft = RecordDraft::new(RecordType::Issue, format!("F-{seq}"));
        LedgerRecord::seal(chain(), seq, draft, Utc::now(), prev).unwrap()
    }

    #[test]
    fn test_check_append_first_record() {
        let first = record(1, ChainLink::GENESIS);
        check_append(&chain(), None, &first, None).unwrap();
    }

    #[test]
    fn test_check_append_rejects_stale_head() {
        let first = record(1, ChainLink::GENESIS);
        let second = record(2, *first.link_hash());
        let err = check_append(&chain(), Some(first.head()), &second, None).unwrap_err();
        assert!(matches!(err, LedgerError::AppendConflict { .. }));
    }

    #[test]
    fn test_check_append_rejects_overwrite_and_gaps() {
        let first = record(1, ChainLink::GENESIS);
        let head = Some(first.head());

        let overwrite = record(1, ChainLink::GENESIS);
        assert!(check_append(&chain(), head, &overwrite, head).is_err());

        let gap = record(3, *first.link_hash());
        assert!(check_append(&chain(), head, &gap, head).is_err());

        let wrong_prev = record(2, ChainLink::GENESIS);
        assert!(check_append(&chain(), head, &wrong_prev, head).is_err());
    }

    #[test]
    fn test_check_append_rejects_foreign_chain() {
        let other = ChainKey::new(TenantId::new("other").unwrap(), LedgerKind::Invoices);
        let first = record(1, ChainLink::GENESIS);
        assert!(check_append(&other, None, &first, None).is_err());
    }
}
