//! Verify command - walk hash chains and report the first break.

use std::sync::Arc;

use anyhow::{Result, bail};
use tessera_ledger::{ChainIntegrityResult, ChainKey, ChainVerifier, LedgerStorage};

use crate::theme::Theme;

/// Verify one chain (optionally from a sequence id) or every chain.
///
/// Returns an error when any chain is broken so the process exits non-zero.
pub(crate) fn verify_chains(
    storage: Arc<dyn LedgerStorage>,
    page_size: usize,
    chain: Option<&ChainKey>,
    from: Option<u64>,
) -> Result<()> {
    let verifier = ChainVerifier::new(storage).with_page_size(page_size);

    let results = match chain {
        Some(chain) => vec![verifier.verify(chain, from)?],
        None => {
            if from.is_some() {
                bail!("--from requires --tenant");
            }
            verifier.verify_all()?
        },
    };

    if results.is_empty() {
        println!("{}", Theme::info("No chains to verify"));
        return Ok(());
    }

    for result in &results {
        print_result(result);
    }

    let broken = results.iter().filter(|r| !r.valid).count();
    if broken > 0 {
        bail!("{broken} of {} chain(s) failed verification", results.len());
    }
    Ok(())
}

fn print_result(result: &ChainIntegrityResult) {
    match &result.chain_break {
        None => {
            let head = result
                .head_hash
                .as_ref()
                .map_or_else(|| "-".to_owned(), Theme::hash);
            println!(
                "{}",
                Theme::success(&format!(
                    "{} verified: {} record(s) from #{}, head {head} {}",
                    result.chain,
                    result.records_verified,
                    result.from_sequence,
                    Theme::dimmed(&format!("({:.1?})", result.elapsed)),
                ))
            );
        },
        Some(brk) => {
            println!(
                "{}",
                Theme::error(&format!(
                    "{} broken at #{}: {}",
                    result.chain, brk.sequence_id, brk.kind
                ))
            );
            println!("  {}", Theme::kv("expected", &brk.expected.to_hex()));
            println!("  {}", Theme::kv("actual", &brk.actual.to_hex()));
            println!(
                "  {}",
                Theme::dimmed(&format!(
                    "{} record(s) verified before the break",
                    result.records_verified
                ))
            );
        },
    }
}
