//! End-to-end hash chain integrity: determinism, tamper detection,
//! append-only storage and resumable verification.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{DamagedStorage, ReadTrackingStorage};
use tessera_ledger::{
    AuthorityStatus, BreakKind, ChainIntegrityResult, ChainKey, ChainVerifier, LedgerAppender,
    LedgerError, LedgerRecord, LedgerStorage, MemoryLedgerStorage, RecordDraft, RecordType,
};
use tessera_test::{LedgerContext, append_invoices, memory_ledger, test_chain};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A verification result without its wall-clock timing.
fn timeless(mut result: ChainIntegrityResult) -> ChainIntegrityResult {
    result.elapsed = Duration::ZERO;
    result
}

/// A copy of `record` with one byte of one field value XORed, hashes kept.
fn flip_field_byte(record: &LedgerRecord, field: &str, at: usize) -> LedgerRecord {
    let mut json = serde_json::to_value(record).unwrap();
    let mut bytes = json["fields"][field].as_str().unwrap().as_bytes().to_vec();
    bytes[at] ^= 0x01;
    json["fields"][field] = serde_json::Value::String(String::from_utf8(bytes).unwrap());
    serde_json::from_value(json).unwrap()
}

/// Rewrite one record line of a chain file on disk, keeping its hashes.
fn tamper_file(root: &Path, chain: &ChainKey, seq: u64, field: &str, value: &str) {
    let path = root
        .join(chain.tenant.as_str())
        .join(format!("{}.jsonl", chain.ledger));
    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<String> = content
        .lines()
        .map(|line| {
            let mut json: serde_json::Value = serde_json::from_str(line).unwrap();
            if json["sequence_id"] == seq {
                json["fields"][field] = serde_json::Value::String(value.to_owned());
            }
            serde_json::to_string(&json).unwrap()
        })
        .collect();
    fs::write(&path, format!("{}\n", lines.join("\n"))).unwrap();
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn test_repeated_verification_is_identical() {
    let (storage, appender) = memory_ledger();
    let chain = test_chain("acme");
    append_invoices(&appender, &chain, 25);

    let verifier = ChainVerifier::new(storage).with_page_size(7);
    let first = timeless(verifier.verify(&chain, None).unwrap());
    let second = timeless(verifier.verify(&chain, None).unwrap());

    assert!(first.valid);
    assert_eq!(first.records_verified, 25);
    assert_eq!(first, second);
}

#[test]
fn test_verification_survives_reopen() {
    let ctx = LedgerContext::new();
    let chain = test_chain("acme");
    append_invoices(&ctx.appender, &chain, 10);
    let before = timeless(ChainVerifier::new(ctx.storage.clone()).verify(&chain, None).unwrap());

    let ctx = ctx.reopen();
    let after = timeless(ChainVerifier::new(ctx.storage.clone()).verify(&chain, None).unwrap());

    assert!(before.valid);
    assert_eq!(before, after);
}

// ---------------------------------------------------------------------------
// Tamper detection
// ---------------------------------------------------------------------------

#[test]
fn test_any_flipped_field_byte_breaks_at_that_record() {
    let chain = test_chain("acme");
    let fields = ["issuer_tax_id", "issue_date", "total_amount", "tax_amount"];

    for seq in 1..=5u64 {
        for field in fields {
            let (inner, appender) = memory_ledger();
            let records = append_invoices(&appender, &chain, 5);
            let storage = Arc::new(DamagedStorage::new(inner));
            let pristine = records.iter().find(|r| r.sequence_id() == seq).unwrap();
            let len = pristine.fields().get(field).unwrap().len();

            for at in 0..len {
                // Each flip replaces the previous one.
                storage.damage(flip_field_byte(pristine, field, at));

                let result = ChainVerifier::new(storage.clone())
                    .verify(&chain, None)
                    .unwrap();
                assert!(!result.valid, "flip of {field}[{at}] in #{seq} went unnoticed");
                let brk = result.chain_break.unwrap();
                assert_eq!(brk.sequence_id, seq);
                assert_eq!(brk.kind, BreakKind::LinkHashMismatch);
                assert_eq!(result.records_verified, seq.saturating_sub(1));
            }
        }
    }
}

#[test]
fn test_tampered_file_is_reported_after_reopen() {
    let chain = test_chain("acme");
    for seq in [1u64, 3, 5] {
        let ctx = LedgerContext::new();
        append_invoices(&ctx.appender, &chain, 5);
        let root = ctx.dir.path().to_path_buf();
        let LedgerContext {
            dir,
            storage,
            appender,
        } = ctx;
        drop(appender);
        drop(storage);

        tamper_file(&root, &chain, seq, "total_amount", "9999.00");

        let storage = Arc::new(tessera_ledger::FileLedgerStorage::open(dir.path()).unwrap());
        let result = ChainVerifier::new(storage).verify(&chain, None).unwrap();

        assert!(!result.valid);
        assert_eq!(result.chain_break.as_ref().unwrap().sequence_id, seq);
        assert_eq!(result.records_verified, seq.saturating_sub(1));
        assert!(matches!(
            result.into_result(),
            Err(LedgerError::ChainBreak { sequence_id, .. }) if sequence_id == seq
        ));
    }
}

// ---------------------------------------------------------------------------
// Append-only storage
// ---------------------------------------------------------------------------

#[test]
fn test_committed_record_cannot_be_rewritten() {
    let (storage, appender) = memory_ledger();
    let chain = test_chain("acme");
    let records = append_invoices(&appender, &chain, 3);

    // Forge a replacement for #2 with different content and its own valid
    // link, then try to commit it over the original.
    let forged_storage = Arc::new(MemoryLedgerStorage::new());
    let forger = LedgerAppender::new(forged_storage.clone());
    forger
        .append(&chain, RecordDraft::new(RecordType::Issue, "INV-0001"))
        .unwrap();
    let forged = forger
        .append(
            &chain,
            RecordDraft::new(RecordType::Issue, "INV-0002").with_field("total_amount", "0.01"),
        )
        .unwrap();

    let head = storage.head(&chain).unwrap();
    assert!(matches!(
        storage.append(forged.clone(), head),
        Err(LedgerError::AppendConflict { .. })
    ));
    assert!(matches!(
        storage.append(forged, Some(records[0].head())),
        Err(LedgerError::AppendConflict { .. })
    ));
    assert_eq!(storage.get(&chain, 2).unwrap().unwrap(), records[1]);
}

#[test]
fn test_status_updates_never_touch_chained_content() {
    let ctx = LedgerContext::new();
    let chain = test_chain("acme");
    let records = append_invoices(&ctx.appender, &chain, 4);
    let records_file = ctx.dir.path().join("acme").join("invoices.jsonl");
    let bytes_before = fs::read(&records_file).unwrap();

    let storage = &ctx.storage;
    storage
        .update_status(&chain, 1, AuthorityStatus::accepted(Some("CSV-1".into()), None))
        .unwrap();
    storage
        .update_status(&chain, 2, AuthorityStatus::rejected("1100", "invalid tax id"))
        .unwrap();
    storage
        .update_status(&chain, 3, AuthorityStatus::error(Some("503".into()), "unavailable"))
        .unwrap();
    storage.update_status(&chain, 3, AuthorityStatus::retry()).unwrap();

    assert_eq!(fs::read(&records_file).unwrap(), bytes_before);
    for original in &records {
        let stored = storage.get(&chain, original.sequence_id()).unwrap().unwrap();
        assert!(stored.same_content(original));
        assert_eq!(stored.link_hash(), original.link_hash());
    }
    assert!(
        ChainVerifier::new(ctx.storage.clone())
            .verify(&chain, None)
            .unwrap()
            .valid
    );
}

// ---------------------------------------------------------------------------
// Resumable verification
// ---------------------------------------------------------------------------

#[test]
fn test_verify_from_three_uses_record_two_as_anchor() {
    let (inner, appender) = memory_ledger();
    let chain = test_chain("acme");
    let records = append_invoices(&appender, &chain, 5);

    let tracking = Arc::new(ReadTrackingStorage::new(inner));
    let result = ChainVerifier::new(tracking.clone())
        .verify(&chain, Some(3))
        .unwrap();

    assert!(result.valid);
    assert_eq!(result.from_sequence, 3);
    assert_eq!(result.records_verified, 3);
    assert_eq!(result.last_sequence, Some(5));
    assert_eq!(result.head_hash.as_ref(), Some(records[4].link_hash()));

    // Only the anchor (#2) and the walked records were read.
    assert_eq!(tracking.reads(), vec![2, 3, 4, 5]);
}

#[test]
fn test_resume_ignores_damage_before_anchor() {
    let (inner, appender) = memory_ledger();
    let chain = test_chain("acme");
    let records = append_invoices(&appender, &chain, 5);
    let storage = Arc::new(DamagedStorage::new(inner));
    storage.damage(flip_field_byte(&records[0], "total_amount", 0));

    let verifier = ChainVerifier::new(storage);
    assert!(!verifier.verify(&chain, None).unwrap().valid);
    assert!(verifier.verify(&chain, Some(3)).unwrap().valid);
}
