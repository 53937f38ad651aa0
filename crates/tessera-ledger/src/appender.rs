//! Single-writer appends.
//!
//! Each chain gets its own [`ChainContext`] behind its own mutex. Appends to
//! one chain are strictly serialized through it; appends to different
//! chains never touch the same lock.

use std::sync::{Arc, Mutex};

use chrono::SubsecRound;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::chain::ChainKey;
use crate::clock::{Clock, SystemClock};
use crate::error::{LedgerError, LedgerResult};
use crate::link::ChainLink;
use crate::record::{ChainHead, LedgerRecord, RecordDraft};
use crate::storage::LedgerStorage;

/// Append state of one chain: its last committed head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainContext {
    chain: ChainKey,
    head: Option<ChainHead>,
    synced: bool,
}

impl ChainContext {
    fn new(chain: ChainKey) -> Self {
        Self {
            chain,
            head: None,
            synced: false,
        }
    }

    /// The chain this context serializes.
    #[must_use]
    pub fn chain(&self) -> &ChainKey {
        &self.chain
    }

    /// Last head committed through this context, if known.
    #[must_use]
    pub fn head(&self) -> Option<ChainHead> {
        if self.synced { self.head } else { None }
    }

    fn load(&mut self, storage: &dyn LedgerStorage) -> LedgerResult<Option<ChainHead>> {
        if !self.synced {
            self.head = storage.head(&self.chain)?;
            self.synced = true;
        }
        Ok(self.head)
    }

    fn invalidate(&mut self) {
        self.synced = false;
        self.head = None;
    }
}

/// Appends records to ledger chains.
pub struct LedgerAppender {
    storage: Arc<dyn LedgerStorage>,
    clock: Arc<dyn Clock>,
    contexts: DashMap<ChainKey, Arc<Mutex<ChainContext>>>,
}

impl LedgerAppender {
    /// Create an appender using the system clock.
    #[must_use]
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    /// Create an appender with an explicit clock.
    #[must_use]
    pub fn with_clock(storage: Arc<dyn LedgerStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            contexts: DashMap::new(),
        }
    }

    /// Seal `draft` onto the end of `chain` and commit it.
    ///
    /// The chain's context lock is held from reading the head until the
    /// storage commit returns. If the commit fails nothing becomes visible,
    /// and the context is resynchronized from storage on the next append.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRecord`] for an invalid draft, and
    /// [`LedgerError::AppendConflict`] or [`LedgerError::Storage`] if the
    /// commit is refused or fails.
    pub fn append(&self, chain: &ChainKey, draft: RecordDraft) -> LedgerResult<LedgerRecord> {
        let context = self.context_lock(chain);
        let mut context = context.lock().map_err(LedgerError::storage)?;

        let head = context.load(self.storage.as_ref())?;
        let (sequence_id, previous_hash) = match head {
            Some(head) => (
                head.sequence_id
                    .checked_add(1)
                    .ok_or_else(|| LedgerError::AppendConflict {
                        chain: chain.to_string(),
                        reason: "sequence id space exhausted".to_string(),
                    })?,
                head.link_hash,
            ),
            None => (1, ChainLink::GENESIS),
        };

        // Stored timestamps carry microsecond precision, as hashed.
        let created_at = self.clock.now().trunc_subsecs(6);
        let record = LedgerRecord::seal(
            chain.clone(),
            sequence_id,
            draft,
            created_at,
            previous_hash,
        )?;

        if let Err(e) = self.storage.append(record.clone(), head) {
            warn!(
                tenant = %chain.tenant,
                ledger = %chain.ledger,
                sequence_id,
                error = %e,
                "Ledger append rolled back"
            );
            context.invalidate();
            return Err(e);
        }
        context.head = Some(record.head());

        debug!(
            tenant = %chain.tenant,
            ledger = %chain.ledger,
            sequence_id,
            record_type = record.record_type().label(),
            link_hash = %record.link_hash().short(),
            "Appended ledger record"
        );
        Ok(record)
    }

    /// Snapshot of a chain's append context, if the chain was appended to.
    #[must_use]
    pub fn context(&self, chain: &ChainKey) -> Option<ChainContext> {
        let context = self.contexts.get(chain)?.value().clone();
        let guard = context.lock().ok()?;
        Some(guard.clone())
    }

    /// The storage this appender commits to.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn LedgerStorage> {
        &self.storage
    }

    fn context_lock(&self, chain: &ChainKey) -> Arc<Mutex<ChainContext>> {
        self.contexts
            .entry(chain.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ChainContext::new(chain.clone()))))
            .value()
            .clone()
    }
}

impl std::fmt::Debug for LedgerAppender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerAppender")
            .field("chains", &self.contexts.len())
            .finish_non_exhaustive()
    }
}
