//! Test fixtures for ledger and submission types.

use std::sync::Arc;

use tessera_crypto::{KeyId, SecretKey, StaticKeyProvider};
use tessera_ledger::{
    ChainKey, LedgerAppender, LedgerKind, LedgerRecord, MemoryLedgerStorage, RecordDraft,
    RecordType, TenantId,
};

/// Key name used by [`test_key_provider`].
pub const TEST_KEY_NAME: &str = "records";

/// Invoice chain of `tenant`.
///
/// # Panics
///
/// Panics if `tenant` is not a valid tenant id.
#[must_use]
pub fn test_chain(tenant: &str) -> ChainKey {
    ChainKey::new(
        TenantId::new(tenant).expect("invalid tenant id"),
        LedgerKind::Invoices,
    )
}

/// Secure-message audit chain of `tenant`.
///
/// # Panics
///
/// Panics if `tenant` is not a valid tenant id.
#[must_use]
pub fn test_message_chain(tenant: &str) -> ChainKey {
    ChainKey::new(
        TenantId::new(tenant).expect("invalid tenant id"),
        LedgerKind::Messages,
    )
}

/// Empty in-memory storage and an appender over it.
#[must_use]
pub fn memory_ledger() -> (Arc<MemoryLedgerStorage>, LedgerAppender) {
    let storage = Arc::new(MemoryLedgerStorage::new());
    let appender = LedgerAppender::new(storage.clone());
    (storage, appender)
}

/// Correlation id of the `n`th fixture invoice (`INV-0001`, ...).
#[must_use]
pub fn invoice_number(n: usize) -> String {
    format!("INV-{n:04}")
}

/// Draft for an issued invoice with typical fields.
#[must_use]
pub fn invoice_draft(n: usize) -> RecordDraft {
    RecordDraft::new(RecordType::Issue, invoice_number(n))
        .with_field("issuer_tax_id", "B12345678")
        .with_field("issue_date", "2026-03-01")
        .with_field("total_amount", format!("{n}.00"))
        .with_field("tax_amount", format!("{n}.21"))
}

/// Append invoices `1..=count` to `chain`.
///
/// # Panics
///
/// Panics if an append fails.
pub fn append_invoices(
    appender: &LedgerAppender,
    chain: &ChainKey,
    count: usize,
) -> Vec<LedgerRecord> {
    (1..=count)
        .map(|n| {
            appender
                .append(chain, invoice_draft(n))
                .expect("Failed to append fixture invoice")
        })
        .collect()
}

/// Key provider holding one fresh key under [`TEST_KEY_NAME`], version 1.
///
/// # Panics
///
/// Panics if the key cannot be registered.
#[must_use]
pub fn test_key_provider() -> StaticKeyProvider {
    let keys = StaticKeyProvider::new();
    keys.register(KeyId::new(TEST_KEY_NAME, 1), SecretKey::generate())
        .expect("Failed to register test key");
    keys
}

/// Authority body answering every listed record individually.
///
/// Each entry is `(correlation_id, accepted)`. Rejections carry code `1100`.
#[must_use]
pub fn per_record_body(outcomes: &[(&str, bool)]) -> String {
    let records: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|(id, accepted)| {
            if *accepted {
                serde_json::json!({"correlation_id": id, "status": "accepted"})
            } else {
                serde_json::json!({
                    "correlation_id": id,
                    "status": "rejected",
                    "code": "1100",
                    "message": "invalid tax id",
                })
            }
        })
        .collect();
    let status = if outcomes.iter().all(|(_, accepted)| *accepted) {
        "accepted"
    } else {
        "partially_accepted"
    };
    serde_json::json!({
        "status": status,
        "confirmation": "MOCK-CSV",
        "records": records,
    })
    .to_string()
}

/// Authority body rejecting the whole submission.
#[must_use]
pub fn rejected_body(code: &str, message: &str) -> String {
    serde_json::json!({"status": "rejected", "code": code, "message": message}).to_string()
}
