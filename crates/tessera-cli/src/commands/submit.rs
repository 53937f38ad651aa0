//! Submit command - send pending records to the authority and reconcile.

use std::sync::Arc;

use anyhow::{Result, bail};
use tessera_ledger::ChainKey;
use tessera_remision::{CycleReport, RemisionOutcome, RemisionService, SkipReason};

use crate::theme::Theme;

/// Run one submission cycle for `chain`, or for every chain concurrently.
///
/// Returns an error if any cycle failed outright; authority rejections and
/// exhausted retries are reported but do not fail the command.
pub(crate) async fn submit(service: RemisionService, chain: Option<&ChainKey>) -> Result<()> {
    let results = match chain {
        Some(chain) => vec![(chain.clone(), service.run_cycle(chain).await)],
        None => Arc::new(service).run_all().await?,
    };

    if results.is_empty() {
        println!("{}", Theme::info("No chains in the ledger"));
        return Ok(());
    }

    let mut failed: usize = 0;
    for (chain, outcome) in &results {
        match outcome {
            Ok(report) => print_report(chain, report),
            Err(e) => {
                failed = failed.saturating_add(1);
                println!("{}", Theme::error(&format!("{chain}: {e}")));
            },
        }
    }

    if failed > 0 {
        bail!("{failed} of {} submission cycle(s) failed", results.len());
    }
    Ok(())
}

fn print_report(chain: &ChainKey, report: &CycleReport) {
    match report {
        CycleReport::Skipped(SkipReason::NothingToSend) => {
            println!("{}", Theme::dimmed(&format!("{chain}: nothing to send")));
        },
        CycleReport::Skipped(SkipReason::CircuitOpen { remaining }) => {
            println!(
                "{}",
                Theme::warning(&format!(
                    "{chain}: circuit open, submissions resume in {}s",
                    remaining.as_secs()
                ))
            );
        },
        CycleReport::Skipped(SkipReason::FlowControl { wait }) => {
            println!(
                "{}",
                Theme::info(&format!(
                    "{chain}: submitted recently, next slot in {}s",
                    wait.as_secs()
                ))
            );
        },
        CycleReport::Submitted {
            batch,
            result,
            report,
        } => {
            let summary = format!(
                "{chain}: batch {} of {} record(s) {} after {} attempt(s)",
                batch.id(),
                batch.len(),
                result.outcome.label(),
                result.attempts
            );
            let line = match &result.outcome {
                RemisionOutcome::Success { .. } => Theme::success(&summary),
                RemisionOutcome::Partial { .. } | RemisionOutcome::Cancelled => {
                    Theme::warning(&summary)
                },
                RemisionOutcome::Exhausted { last_error } => {
                    Theme::warning(&format!("{summary}; left queued ({last_error})"))
                },
                RemisionOutcome::Rejected { code, message } => {
                    Theme::error(&format!("{summary}: [{code}] {message}"))
                },
                RemisionOutcome::Permanent { status, message } => {
                    Theme::error(&format!("{summary}: HTTP {status} {message}"))
                },
            };
            println!("{line}");
            println!(
                "  {}",
                Theme::dimmed(&format!(
                    "accepted {}, rejected {}, error {}, unmatched {}, skipped {}",
                    report.accepted,
                    report.rejected,
                    report.errored,
                    report.unmatched,
                    report.skipped
                ))
            );
        },
    }
}
