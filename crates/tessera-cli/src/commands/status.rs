//! Status command - show authority status of ledger records.

use anyhow::Result;
use colored::Colorize;
use tessera_ledger::{ChainKey, LedgerRecord, LedgerStorage, StatusState};

use crate::theme::Theme;

/// Records read per storage round-trip when counting.
const PAGE_SIZE: usize = 500;

/// Per-state record counts of one chain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateCounts {
    pub(crate) pending: u64,
    pub(crate) accepted: u64,
    pub(crate) rejected: u64,
    pub(crate) error: u64,
}

impl StateCounts {
    fn add(&mut self, state: StatusState) {
        let slot = match state {
            StatusState::Pending => &mut self.pending,
            StatusState::Accepted => &mut self.accepted,
            StatusState::Rejected => &mut self.rejected,
            StatusState::Error => &mut self.error,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Count records of `chain` by authority state.
pub(crate) fn count_states(storage: &dyn LedgerStorage, chain: &ChainKey) -> Result<StateCounts> {
    let mut counts = StateCounts::default();
    let mut from = 1u64;
    loop {
        let page = storage.range(chain, from, None, PAGE_SIZE)?;
        let Some(last) = page.last().map(LedgerRecord::sequence_id) else {
            break;
        };
        for record in &page {
            counts.add(record.state());
        }
        match last.checked_add(1) {
            Some(next) => from = next,
            None => break,
        }
    }
    Ok(counts)
}

/// Print a per-state summary of every chain.
pub(crate) fn show_summary(storage: &dyn LedgerStorage) -> Result<()> {
    let chains = storage.chains()?;
    if chains.is_empty() {
        println!("{}", Theme::info("No chains in the ledger"));
        return Ok(());
    }

    println!("\n{}", Theme::header("Ledger Status"));
    println!(
        "{:<28} {:>8} {:>8} {:>8} {:>8}",
        "CHAIN".dimmed(),
        "PENDING".dimmed(),
        "ACCEPTED".dimmed(),
        "REJECTED".dimmed(),
        "ERROR".dimmed()
    );
    println!("{}", Theme::separator());

    for chain in &chains {
        let c = count_states(storage, chain)?;
        println!(
            "{:<28} {:>8} {:>8} {:>8} {:>8}",
            chain.to_string(),
            c.pending,
            c.accepted,
            c.rejected,
            c.error
        );
    }

    println!();
    Ok(())
}

/// List records of one chain starting at `from`.
pub(crate) fn show_records(
    storage: &dyn LedgerStorage,
    chain: &ChainKey,
    from: u64,
    limit: usize,
    json: bool,
) -> Result<()> {
    let records = storage.range(chain, from.max(1), None, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", Theme::info(&format!("No records in {chain} from #{from}")));
        return Ok(());
    }

    println!("\n{}", Theme::header(&format!("Records of {chain}")));
    println!(
        "{:>6}  {:<10} {:<20} {:<10} {:<19}  {}",
        "SEQ".dimmed(),
        "TYPE".dimmed(),
        "CORRELATION".dimmed(),
        "STATUS".dimmed(),
        "CREATED".dimmed(),
        "CODE".dimmed()
    );
    println!("{}", Theme::separator());

    for record in &records {
        let status = record.status();
        let detail = match (&status.code, &status.message) {
            (Some(code), Some(message)) => format!("{code} {message}"),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => String::new(),
        };
        println!(
            "{:>6}  {:<10} {:<20} {:<10} {}  {}",
            record.sequence_id(),
            record.record_type().label(),
            record.correlation_id(),
            Theme::state(status.state),
            Theme::timestamp(&record.created_at()),
            Theme::dimmed(&detail)
        );
    }

    println!();
    Ok(())
}
