//! Append command - add a record to a chain.

use anyhow::{Context, Result, bail};
use tessera_ledger::{ChainKey, LedgerAppender, LedgerStorage, RecordDraft, RecordType};

use crate::theme::Theme;

/// Kind of record to append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum RecordKind {
    /// Newly issued invoice.
    Issue,
    /// Cancellation of an issued invoice.
    Cancel,
    /// Rectifying invoice (requires `--corrects`).
    Rectify,
    /// Audit event (requires `--event`).
    Event,
}

/// Resolve the record type from the command-line flags.
pub(crate) fn record_type(
    kind: RecordKind,
    corrects: Option<String>,
    event: Option<String>,
) -> Result<RecordType> {
    match (kind, corrects, event) {
        (RecordKind::Issue, None, None) => Ok(RecordType::Issue),
        (RecordKind::Cancel, None, None) => Ok(RecordType::Cancel),
        (RecordKind::Rectify, Some(corrects), None) => Ok(RecordType::Rectify { corrects }),
        (RecordKind::Rectify, None, _) => bail!("--type rectify requires --corrects"),
        (RecordKind::Event, None, Some(kind)) => Ok(RecordType::Event { kind }),
        (RecordKind::Event, _, None) => bail!("--type event requires --event"),
        (_, Some(_), _) => bail!("--corrects only applies to --type rectify"),
        (_, _, Some(_)) => bail!("--event only applies to --type event"),
    }
}

/// Parse `key=value` field arguments.
pub(crate) fn parse_fields(fields: &[String]) -> Result<Vec<(String, String)>> {
    fields
        .iter()
        .map(|f| {
            let (key, value) = f
                .split_once('=')
                .with_context(|| format!("field '{f}' is not in key=value form"))?;
            let key = key.trim();
            if key.is_empty() {
                bail!("field '{f}' has an empty key");
            }
            Ok((key.to_owned(), value.to_owned()))
        })
        .collect()
}

/// Append one record and print its position in the chain.
pub(crate) fn append_record(
    storage: std::sync::Arc<dyn LedgerStorage>,
    chain: &ChainKey,
    record_type: RecordType,
    correlation_id: &str,
    fields: &[(String, String)],
) -> Result<()> {
    let draft = fields.iter().fold(
        RecordDraft::new(record_type, correlation_id),
        |draft, (key, value)| draft.with_field(key, value),
    );

    let appender = LedgerAppender::new(storage);
    let record = appender.append(chain, draft)?;

    println!(
        "{}",
        Theme::success(&format!(
            "Appended {} #{} to {chain}",
            record.record_type().label(),
            record.sequence_id()
        ))
    );
    println!("  {}", Theme::kv("correlation id", record.correlation_id()));
    println!("  {}", Theme::kv("link hash", &Theme::hash(record.link_hash())));
    Ok(())
}
