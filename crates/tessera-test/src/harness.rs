//! Test harness helpers.

use std::sync::Arc;

use tempfile::TempDir;
use tessera_ledger::{FileLedgerStorage, LedgerAppender};
use tracing_subscriber::EnvFilter;

/// Create a temporary directory for testing.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::with_prefix("tessera-").expect("Failed to create temp directory")
}

/// Set up test logging with the given filter.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Set up test logging with default filter (warn level).
pub fn setup_test_logging_default() {
    setup_test_logging("warn");
}

/// A ledger on disk inside a temporary directory.
///
/// Dropping the context removes the directory. [`reopen`](Self::reopen)
/// closes the storage and opens a fresh one over the same files, as a
/// restarted process would.
pub struct LedgerContext {
    /// Temporary directory holding the ledger files.
    pub dir: TempDir,
    /// Storage over `dir`.
    pub storage: Arc<FileLedgerStorage>,
    /// Appender over `storage`.
    pub appender: LedgerAppender,
}

impl LedgerContext {
    /// Open an empty file ledger.
    ///
    /// # Panics
    ///
    /// Panics if the storage cannot be opened.
    #[must_use]
    pub fn new() -> Self {
        let dir = test_dir();
        let storage =
            Arc::new(FileLedgerStorage::open(dir.path()).expect("Failed to open file ledger"));
        let appender = LedgerAppender::new(storage.clone());
        Self {
            dir,
            storage,
            appender,
        }
    }

    /// Close the storage and open it again from disk.
    ///
    /// # Panics
    ///
    /// Panics if the storage cannot be opened, including when a clone of
    /// the old `storage` is still alive and holds the directory lock.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self {
            dir,
            storage,
            appender,
        } = self;
        drop(appender);
        drop(storage);

        let storage =
            Arc::new(FileLedgerStorage::open(dir.path()).expect("Failed to reopen file ledger"));
        let appender = LedgerAppender::new(storage.clone());
        Self {
            dir,
            storage,
            appender,
        }
    }
}

impl Default for LedgerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LedgerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerContext")
            .field("dir", &self.dir.path())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{append_invoices, test_chain};
    use tessera_ledger::LedgerStorage;

    #[test]
    fn test_temp_dir() {
        let dir = test_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_reopen_sees_appended_records() {
        let ctx = LedgerContext::new();
        let chain = test_chain("acme");
        append_invoices(&ctx.appender, &chain, 3);

        let ctx = ctx.reopen();
        assert_eq!(ctx.storage.count(&chain).unwrap(), 3);
        assert_eq!(
            ctx.storage.head(&chain).unwrap().map(|h| h.sequence_id),
            Some(3)
        );
    }
}
