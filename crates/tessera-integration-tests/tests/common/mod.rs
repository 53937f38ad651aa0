//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tessera_ledger::{
    AuthorityStatus, ChainHead, ChainKey, LedgerRecord, LedgerResult, LedgerStorage,
};
use tessera_remision::{SubmissionRequest, Transport, TransportError};
use tessera_test::MockTransport;

/// Storage wrapper that records which sequence ids were read.
pub struct ReadTrackingStorage {
    inner: Arc<dyn LedgerStorage>,
    reads: Mutex<Vec<u64>>,
}

impl ReadTrackingStorage {
    pub fn new(inner: Arc<dyn LedgerStorage>) -> Self {
        Self {
            inner,
            reads: Mutex::new(Vec::new()),
        }
    }

    /// Sequence ids returned by `get` and `range`, in call order.
    pub fn reads(&self) -> Vec<u64> {
        self.reads.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.reads.lock().unwrap().clear();
    }

    fn track<'a>(&self, records: impl IntoIterator<Item = &'a LedgerRecord>) {
        let mut reads = self.reads.lock().unwrap();
        reads.extend(records.into_iter().map(LedgerRecord::sequence_id));
    }
}

impl LedgerStorage for ReadTrackingStorage {
    fn head(&self, chain: &ChainKey) -> LedgerResult<Option<ChainHead>> {
        self.inner.head(chain)
    }

    fn append(&self, record: LedgerRecord, expected_head: Option<ChainHead>) -> LedgerResult<()> {
        self.inner.append(record, expected_head)
    }

    fn get(&self, chain: &ChainKey, sequence_id: u64) -> LedgerResult<Option<LedgerRecord>> {
        let record = self.inner.get(chain, sequence_id)?;
        self.track(record.iter());
        Ok(record)
    }

    fn range(
        &self,
        chain: &ChainKey,
        from: u64,
        to: Option<u64>,
        limit: usize,
    ) -> LedgerResult<Vec<LedgerRecord>> {
        let records = self.inner.range(chain, from, to, limit)?;
        self.track(records.iter());
        Ok(records)
    }

    fn update_status(
        &self,
        chain: &ChainKey,
        sequence_id: u64,
        next: AuthorityStatus,
    ) -> LedgerResult<AuthorityStatus> {
        self.inner.update_status(chain, sequence_id, next)
    }

    fn chains(&self) -> LedgerResult<Vec<ChainKey>> {
        self.inner.chains()
    }

    fn count(&self, chain: &ChainKey) -> LedgerResult<u64> {
        self.inner.count(chain)
    }
}

/// Storage wrapper that serves damaged copies of chosen records, as a
/// corrupted backend would. The wrapped storage is never modified.
pub struct DamagedStorage {
    inner: Arc<dyn LedgerStorage>,
    damaged: Mutex<HashMap<(ChainKey, u64), LedgerRecord>>,
}

impl DamagedStorage {
    pub fn new(inner: Arc<dyn LedgerStorage>) -> Self {
        Self {
            inner,
            damaged: Mutex::new(HashMap::new()),
        }
    }

    /// Serve `record` in place of the stored record with its sequence id.
    pub fn damage(&self, record: LedgerRecord) {
        let key = (record.chain().clone(), record.sequence_id());
        self.damaged.lock().unwrap().insert(key, record);
    }

    fn served(&self, record: LedgerRecord) -> LedgerRecord {
        let key = (record.chain().clone(), record.sequence_id());
        self.damaged
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or(record)
    }
}

impl LedgerStorage for DamagedStorage {
    fn head(&self, chain: &ChainKey) -> LedgerResult<Option<ChainHead>> {
        self.inner.head(chain)
    }

    fn append(&self, record: LedgerRecord, expected_head: Option<ChainHead>) -> LedgerResult<()> {
        self.inner.append(record, expected_head)
    }

    fn get(&self, chain: &ChainKey, sequence_id: u64) -> LedgerResult<Option<LedgerRecord>> {
        Ok(self
            .inner
            .get(chain, sequence_id)?
            .map(|record| self.served(record)))
    }

    fn range(
        &self,
        chain: &ChainKey,
        from: u64,
        to: Option<u64>,
        limit: usize,
    ) -> LedgerResult<Vec<LedgerRecord>> {
        Ok(self
            .inner
            .range(chain, from, to, limit)?
            .into_iter()
            .map(|record| self.served(record))
            .collect())
    }

    fn update_status(
        &self,
        chain: &ChainKey,
        sequence_id: u64,
        next: AuthorityStatus,
    ) -> LedgerResult<AuthorityStatus> {
        self.inner.update_status(chain, sequence_id, next)
    }

    fn chains(&self) -> LedgerResult<Vec<ChainKey>> {
        self.inner.chains()
    }

    fn count(&self, chain: &ChainKey) -> LedgerResult<u64> {
        self.inner.count(chain)
    }
}

/// Transport that routes each request to a per-tenant mock.
#[derive(Default)]
pub struct TenantRouter {
    routes: HashMap<String, MockTransport>,
}

impl TenantRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, tenant: &str, transport: MockTransport) -> Self {
        self.routes.insert(tenant.to_owned(), transport);
        self
    }
}

#[async_trait]
impl Transport for TenantRouter {
    async fn send(&self, request: &SubmissionRequest) -> Result<Vec<u8>, TransportError> {
        match self.routes.get(&request.tenant) {
            Some(transport) => transport.send(request).await,
            None => Err(TransportError::Connect(format!(
                "no route for tenant {}",
                request.tenant
            ))),
        }
    }
}
