//! Chain verification.
//!
//! The verifier walks a chain in ascending sequence order, recomputing every
//! link, and stops at the first record that does not line up. It only ever
//! reads from storage.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tessera_crypto::ContentHash;
use tracing::{error, info};

use crate::chain::ChainKey;
use crate::error::{LedgerError, LedgerResult};
use crate::link::ChainLink;
use crate::storage::LedgerStorage;

/// Default number of records read per storage round-trip.
const DEFAULT_PAGE_SIZE: usize = 500;

/// What kind of mismatch broke the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakKind {
    /// A sequence id is missing.
    SequenceGap {
        /// The sequence id that should have come next.
        expected_sequence: u64,
    },
    /// The stored previous hash is not the predecessor's link hash.
    PreviousHashMismatch,
    /// The stored link hash does not match the recomputed one.
    LinkHashMismatch,
    /// The record claims to belong to another chain.
    ForeignRecord,
}

impl fmt::Display for BreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SequenceGap { expected_sequence } => {
                write!(f, "sequence gap (expected {expected_sequence})")
            },
            Self::PreviousHashMismatch => f.write_str("previous hash mismatch"),
            Self::LinkHashMismatch => f.write_str("link hash mismatch"),
            Self::ForeignRecord => f.write_str("record from another chain"),
        }
    }
}

/// First point of divergence in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainBreak {
    /// Sequence id of the first bad record.
    pub sequence_id: u64,
    /// Mismatch kind.
    pub kind: BreakKind,
    /// Hash the chain required at this point.
    pub expected: ContentHash,
    /// Hash actually found.
    pub actual: ContentHash,
}

/// Outcome of a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainIntegrityResult {
    /// Chain that was verified.
    pub chain: ChainKey,
    /// Whether every walked record verified.
    pub valid: bool,
    /// First sequence id walked.
    pub from_sequence: u64,
    /// Records verified before stopping.
    pub records_verified: u64,
    /// Last sequence id that verified.
    pub last_sequence: Option<u64>,
    /// Link hash of the last verified record.
    pub head_hash: Option<ContentHash>,
    /// Wall time of the walk.
    pub elapsed: Duration,
    /// The break, if one was found.
    pub chain_break: Option<ChainBreak>,
}

impl ChainIntegrityResult {
    /// Convert a failed result into [`LedgerError::ChainBreak`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ChainBreak`] if a break was found.
    pub fn into_result(self) -> LedgerResult<Self> {
        match &self.chain_break {
            Some(brk) => Err(LedgerError::ChainBreak {
                chain: self.chain.to_string(),
                sequence_id: brk.sequence_id,
                expected: brk.expected.to_hex(),
                actual: brk.actual.to_hex(),
            }),
            None => Ok(self),
        }
    }
}

/// Read-only chain verifier.
pub struct ChainVerifier {
    storage: Arc<dyn LedgerStorage>,
    page_size: usize,
}

impl ChainVerifier {
    /// Create a verifier over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self {
            storage,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the number of records read per page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Verify `chain` from `from` (default: the first record) to the head
    /// as it stood when the walk started.
    ///
    /// When resuming from `from > 1`, the link hash of record `from - 1`
    /// is taken as the anchor and earlier records are not read again.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::RecordNotFound`] if the resume anchor does not
    /// exist, or a storage error. A chain break is not an error here; it is
    /// reported in the result.
    pub fn verify(&self, chain: &ChainKey, from: Option<u64>) -> LedgerResult<ChainIntegrityResult> {
        let started = Instant::now();
        let from_sequence = from.unwrap_or(1).max(1);

        let mut expected_previous = match from_sequence.checked_sub(1) {
            Some(anchor) if anchor > 0 => *self
                .storage
                .get(chain, anchor)?
                .ok_or_else(|| LedgerError::RecordNotFound {
                    chain: chain.to_string(),
                    sequence_id: anchor,
                })?
                .link_hash(),
            _ => ChainLink::GENESIS,
        };
        let last_sequence = self.storage.head(chain)?.map(|h| h.sequence_id);

        let mut result = ChainIntegrityResult {
            chain: chain.clone(),
            valid: true,
            from_sequence,
            records_verified: 0,
            last_sequence: None,
            head_hash: None,
            elapsed: Duration::ZERO,
            chain_break: None,
        };

        let mut expected_sequence = from_sequence;
        'walk: while let Some(to) = last_sequence.filter(|last| expected_sequence <= *last) {
            let page = self
                .storage
                .range(chain, expected_sequence, Some(to), self.page_size)?;
            if page.is_empty() {
                break;
            }

            for record in page {
                let found = if record.chain() != chain {
                    Some((BreakKind::ForeignRecord, expected_previous, *record.previous_hash()))
                } else if record.sequence_id() != expected_sequence {
                    Some((
                        BreakKind::SequenceGap { expected_sequence },
                        expected_previous,
                        *record.previous_hash(),
                    ))
                } else if record.previous_hash() != &expected_previous {
                    Some((
                        BreakKind::PreviousHashMismatch,
                        expected_previous,
                        *record.previous_hash(),
                    ))
                } else {
                    let recomputed =
                        ChainLink::compute(record.previous_hash(), &record.canonical_bytes()?);
                    (recomputed != *record.link_hash()).then(|| {
                        (BreakKind::LinkHashMismatch, recomputed, *record.link_hash())
                    })
                };

                if let Some((kind, expected, actual)) = found {
                    error!(
                        chain = %chain,
                        sequence_id = record.sequence_id(),
                        kind = %kind,
                        expected = %expected,
                        actual = %actual,
                        records_verified = result.records_verified,
                        "Ledger chain break detected"
                    );
                    result.valid = false;
                    result.chain_break = Some(ChainBreak {
                        sequence_id: record.sequence_id(),
                        kind,
                        expected,
                        actual,
                    });
                    break 'walk;
                }

                expected_previous = *record.link_hash();
                result.records_verified = result.records_verified.saturating_add(1);
                result.last_sequence = Some(record.sequence_id());
                result.head_hash = Some(expected_previous);
                match expected_sequence.checked_add(1) {
                    Some(next) => expected_sequence = next,
                    None => break 'walk,
                }
            }
        }

        result.elapsed = started.elapsed();
        if result.valid {
            info!(
                chain = %chain,
                from = from_sequence,
                records_verified = result.records_verified,
                elapsed_ms = result.elapsed.as_millis(),
                "Ledger chain verified"
            );
        }
        Ok(result)
    }

    /// Verify every chain in storage from its first record.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered.
    pub fn verify_all(&self) -> LedgerResult<Vec<ChainIntegrityResult>> {
        self.storage
            .chains()?
            .iter()
            .map(|chain| self.verify(chain, None))
            .collect()
    }
}

impl fmt::Debug for ChainVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainVerifier")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}
