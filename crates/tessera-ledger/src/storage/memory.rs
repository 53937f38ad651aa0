//! In-memory ledger storage.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use super::{LedgerStorage, check_append};
use crate::chain::ChainKey;
use crate::error::{LedgerError, LedgerResult};
use crate::record::{ChainHead, LedgerRecord};
use crate::status::AuthorityStatus;

type ChainRecords = Arc<RwLock<BTreeMap<u64, LedgerRecord>>>;

/// Ordered in-memory chains.
///
/// Each chain is a `BTreeMap` keyed by sequence id behind its own lock, so
/// chains never contend with each other and a record becomes visible to
/// readers only once it is fully inserted.
#[derive(Default)]
pub struct MemoryLedgerStorage {
    chains: DashMap<ChainKey, ChainRecords>,
}

impl MemoryLedgerStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load persisted records exactly as found, without chain checks, so
    /// the verifier can report any damage. Never replaces a loaded record.
    pub(crate) fn restore(
        &self,
        records: impl IntoIterator<Item = LedgerRecord>,
    ) -> LedgerResult<()> {
        for record in records {
            let chain = self.chain(record.chain());
            let mut guard = chain.write().map_err(LedgerError::storage)?;
            match guard.entry(record.sequence_id()) {
                Entry::Occupied(existing) => {
                    return Err(LedgerError::AppendConflict {
                        chain: record.chain().to_string(),
                        reason: format!("sequence id {} is already loaded", existing.key()),
                    });
                },
                Entry::Vacant(slot) => {
                    slot.insert(record);
                },
            }
        }
        Ok(())
    }

    /// Swap a stored record for `record`, hashes untouched. Simulates
    /// damaged storage.
    #[cfg(test)]
    pub(crate) fn corrupt(&self, record: LedgerRecord) {
        let chain = self.chain(record.chain());
        chain
            .write()
            .unwrap()
            .insert(record.sequence_id(), record);
    }

    fn chain(&self, key: &ChainKey) -> ChainRecords {
        self.chains.entry(key.clone()).or_default().value().clone()
    }

    fn existing(&self, key: &ChainKey) -> Option<ChainRecords> {
        self.chains.get(key).map(|c| c.value().clone())
    }
}

impl LedgerStorage for MemoryLedgerStorage {
    fn head(&self, chain: &ChainKey) -> LedgerResult<Option<ChainHead>> {
        let Some(records) = self.existing(chain) else {
            return Ok(None);
        };
        let guard = records.read().map_err(LedgerError::storage)?;
        Ok(guard.values().next_back().map(LedgerRecord::head))
    }

    fn append(&self, record: LedgerRecord, expected_head: Option<ChainHead>) -> LedgerResult<()> {
        let records = self.chain(record.chain());
        let mut guard = records.write().map_err(LedgerError::storage)?;
        let current = guard.values().next_back().map(LedgerRecord::head);
        check_append(record.chain(), current, &record, expected_head)?;
        guard.insert(record.sequence_id(), record);
        Ok(())
    }

    fn get(&self, chain: &ChainKey, sequence_id: u64) -> LedgerResult<Option<LedgerRecord>> {
        let Some(records) = self.existing(chain) else {
            return Ok(None);
        };
        let guard = records.read().map_err(LedgerError::storage)?;
        Ok(guard.get(&sequence_id).cloned())
    }

    fn range(
        &self,
        chain: &ChainKey,
        from: u64,
        to: Option<u64>,
        limit: usize,
    ) -> LedgerResult<Vec<LedgerRecord>> {
        let Some(records) = self.existing(chain) else {
            return Ok(Vec::new());
        };
        let guard = records.read().map_err(LedgerError::storage)?;
        let to = to.unwrap_or(u64::MAX);
        if from > to {
            return Ok(Vec::new());
        }
        Ok(guard.range(from..=to).map(|(_, r)| r.clone()).take(limit).collect())
    }

    fn update_status(
        &self,
        chain: &ChainKey,
        sequence_id: u64,
        next: AuthorityStatus,
    ) -> LedgerResult<AuthorityStatus> {
        let not_found = || LedgerError::RecordNotFound {
            chain: chain.to_string(),
            sequence_id,
        };
        let records = self.existing(chain).ok_or_else(not_found)?;
        let mut guard = records.write().map_err(LedgerError::storage)?;
        let record = guard.get_mut(&sequence_id).ok_or_else(not_found)?;
        record.transition_status(next)
    }

    fn chains(&self) -> LedgerResult<Vec<ChainKey>> {
        let mut keys: Vec<ChainKey> = self
            .chains
            .iter()
            .filter(|entry| entry.value().read().is_ok_and(|g| !g.is_empty()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn count(&self, chain: &ChainKey) -> LedgerResult<u64> {
        let Some(records) = self.existing(chain) else {
            return Ok(0);
        };
        let guard = records.read().map_err(LedgerError::storage)?;
        u64::try_from(guard.len()).map_err(LedgerError::storage)
    }
}

impl std::fmt::Debug for MemoryLedgerStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedgerStorage")
            .field("chains", &self.chains.len())
            .finish()
    }
}
