//! File-backed ledger storage.
//!
//! Layout under the storage root:
//!
//! ```text
//! .lock                          -- exclusive process lock
//! <tenant>/<ledger>.jsonl        -- one committed record per line
//! <tenant>/<ledger>.status.jsonl -- status journal, replayed on open
//! ```
//!
//! A record line is written and `fsync`ed before it enters the in-memory
//! index, so readers never see an uncommitted record. A write that fails
//! part-way is truncated away; a torn trailing line left by a crash is
//! dropped on the next open.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{LedgerStorage, MemoryLedgerStorage, check_append};
use crate::chain::{ChainKey, LedgerKind, TenantId};
use crate::error::{LedgerError, LedgerResult};
use crate::record::{ChainHead, LedgerRecord};
use crate::status::AuthorityStatus;

const LOCK_FILE: &str = ".lock";
const RECORDS_EXT: &str = ".jsonl";
const JOURNAL_EXT: &str = ".status.jsonl";

/// One status journal line.
#[derive(Debug, Serialize, Deserialize)]
struct StatusEntry {
    sequence_id: u64,
    status: AuthorityStatus,
}

/// Holds the exclusive lock on the storage root until dropped.
struct DirLock {
    file: File,
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// JSON-lines ledger storage with an in-memory index.
pub struct FileLedgerStorage {
    root: PathBuf,
    index: MemoryLedgerStorage,
    write_locks: DashMap<ChainKey, Arc<Mutex<()>>>,
    _lock: DirLock,
}

impl FileLedgerStorage {
    /// Open (or create) storage rooted at `root` and load every chain.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the directory cannot be created,
    /// another process holds it, or a chain file cannot be read, and
    /// [`LedgerError::Serialization`] if a committed line does not parse,
    /// and [`LedgerError::AppendConflict`] if a chain file holds a sequence
    /// id twice.
    pub fn open(root: impl AsRef<Path>) -> LedgerResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(LedgerError::storage)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(root.join(LOCK_FILE))
            .map_err(LedgerError::storage)?;
        lock_file.try_lock_exclusive().map_err(|e| {
            LedgerError::Storage(format!(
                "ledger directory {} is in use: {e}",
                root.display()
            ))
        })?;

        let storage = Self {
            root,
            index: MemoryLedgerStorage::new(),
            write_locks: DashMap::new(),
            _lock: DirLock { file: lock_file },
        };
        storage.load()?;
        Ok(storage)
    }

    /// Storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn records_path(&self, chain: &ChainKey) -> PathBuf {
        self.root
            .join(chain.tenant.as_str())
            .join(format!("{}{RECORDS_EXT}", chain.ledger))
    }

    fn journal_path(&self, chain: &ChainKey) -> PathBuf {
        self.root
            .join(chain.tenant.as_str())
            .join(format!("{}{JOURNAL_EXT}", chain.ledger))
    }

    fn write_lock(&self, chain: &ChainKey) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(chain.clone())
            .or_default()
            .value()
            .clone()
    }

    fn load(&self) -> LedgerResult<()> {
        for tenant_dir in fs::read_dir(&self.root).map_err(LedgerError::storage)? {
            let tenant_dir = tenant_dir.map_err(LedgerError::storage)?;
            if !tenant_dir.file_type().map_err(LedgerError::storage)?.is_dir() {
                continue;
            }
            let name = tenant_dir.file_name().to_string_lossy().into_owned();
            let Ok(tenant) = TenantId::new(name.as_str()) else {
                warn!(dir = %name, "Skipping directory that is not a tenant id");
                continue;
            };

            for file in fs::read_dir(tenant_dir.path()).map_err(LedgerError::storage)? {
                let file = file.map_err(LedgerError::storage)?;
                let file_name = file.file_name().to_string_lossy().into_owned();
                if file_name.ends_with(JOURNAL_EXT) {
                    continue;
                }
                let Some(stem) = file_name.strip_suffix(RECORDS_EXT) else {
                    continue;
                };
                let Ok(ledger) = stem.parse::<LedgerKind>() else {
                    warn!(file = %file_name, "Skipping unknown ledger file");
                    continue;
                };
                self.load_chain(&ChainKey::new(tenant.clone(), ledger))?;
            }
        }
        Ok(())
    }

    fn load_chain(&self, chain: &ChainKey) -> LedgerResult<()> {
        let records: Vec<LedgerRecord> = read_lines(&self.records_path(chain))?;
        let loaded = records.len();
        self.index.restore(records)?;

        let mut replayed = 0usize;
        for entry in read_lines::<StatusEntry>(&self.journal_path(chain))? {
            match self
                .index
                .update_status(chain, entry.sequence_id, entry.status)
            {
                Ok(_) => replayed = replayed.saturating_add(1),
                Err(e) => warn!(
                    chain = %chain,
                    sequence_id = entry.sequence_id,
                    error = %e,
                    "Skipping status journal entry"
                ),
            }
        }

        info!(chain = %chain, records = loaded, status_entries = replayed, "Loaded ledger chain");
        Ok(())
    }
}

impl LedgerStorage for FileLedgerStorage {
    fn head(&self, chain: &ChainKey) -> LedgerResult<Option<ChainHead>> {
        self.index.head(chain)
    }

    fn append(&self, record: LedgerRecord, expected_head: Option<ChainHead>) -> LedgerResult<()> {
        let chain = record.chain().clone();
        let lock = self.write_lock(&chain);
        let _guard = lock.lock().map_err(LedgerError::storage)?;

        check_append(&chain, self.index.head(&chain)?, &record, expected_head)?;

        let mut line = serde_json::to_vec(&record).map_err(LedgerError::serialization)?;
        line.push(b'\n');
        append_durably(&self.records_path(&chain), &line)?;

        debug!(chain = %chain, sequence_id = record.sequence_id(), "Committed record to disk");
        self.index.append(record, expected_head)
    }

    fn get(&self, chain: &ChainKey, sequence_id: u64) -> LedgerResult<Option<LedgerRecord>> {
        self.index.get(chain, sequence_id)
    }

    fn range(
        &self,
        chain: &ChainKey,
        from: u64,
        to: Option<u64>,
        limit: usize,
    ) -> LedgerResult<Vec<LedgerRecord>> {
        self.index.range(chain, from, to, limit)
    }

    fn update_status(
        &self,
        chain: &ChainKey,
        sequence_id: u64,
        next: AuthorityStatus,
    ) -> LedgerResult<AuthorityStatus> {
        let lock = self.write_lock(chain);
        let _guard = lock.lock().map_err(LedgerError::storage)?;

        // Validate against the current state before anything reaches the journal.
        let mut probe =
            self.index
                .get(chain, sequence_id)?
                .ok_or_else(|| LedgerError::RecordNotFound {
                    chain: chain.to_string(),
                    sequence_id,
                })?;
        probe.transition_status(next.clone())?;

        let entry = StatusEntry {
            sequence_id,
            status: next.clone(),
        };
        let mut line = serde_json::to_vec(&entry).map_err(LedgerError::serialization)?;
        line.push(b'\n');
        append_durably(&self.journal_path(chain), &line)?;

        self.index.update_status(chain, sequence_id, next)
    }

    fn chains(&self) -> LedgerResult<Vec<ChainKey>> {
        self.index.chains()
    }

    fn count(&self, chain: &ChainKey) -> LedgerResult<u64> {
        self.index.count(chain)
    }
}

impl std::fmt::Debug for FileLedgerStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLedgerStorage")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Append `line` to `path` and `fsync`. On failure the file is cut back to
/// its previous length.
fn append_durably(path: &Path, line: &[u8]) -> LedgerResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(LedgerError::storage)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(LedgerError::storage)?;
    let committed_len = file.metadata().map_err(LedgerError::storage)?.len();

    let written = file.write_all(line).and_then(|()| file.sync_data());
    if let Err(e) = written {
        if let Err(rollback) = file.set_len(committed_len) {
            warn!(path = %path.display(), error = %rollback, "Failed to truncate partial write");
        }
        return Err(LedgerError::Storage(format!(
            "failed to write {}: {e}",
            path.display()
        )));
    }
    Ok(())
}

/// Read newline-terminated JSON lines. A trailing fragment without a
/// newline is a torn write: it is logged, cut from the file and skipped.
fn read_lines<T: DeserializeOwned>(path: &Path) -> LedgerResult<Vec<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LedgerError::storage(e)),
    };

    let complete_len = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos.saturating_add(1));
    if complete_len < bytes.len() {
        warn!(
            path = %path.display(),
            torn_bytes = bytes.len().saturating_sub(complete_len),
            "Dropping torn trailing line"
        );
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(LedgerError::storage)?;
        let len = u64::try_from(complete_len).map_err(LedgerError::storage)?;
        file.set_len(len).map_err(LedgerError::storage)?;
        file.sync_data().map_err(LedgerError::storage)?;
    }

    bytes[..complete_len]
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).map_err(LedgerError::serialization))
        .collect()
}
