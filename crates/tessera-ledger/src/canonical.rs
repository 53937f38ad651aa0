//! Deterministic record encoding for chain hashing.
//!
//! The canonical bytes of a record never depend on map insertion order or
//! on serializer settings. Every record stores the [`CanonicalFormat`] it was
//! hashed under, and verification always re-encodes with that stored format,
//! so introducing a new format never invalidates old chains.
//!
//! # Format v1
//!
//! ```text
//! str("tessera.ledger.v1")
//! u64_be(sequence_id)
//! record_type            -- str(tag) [ str(arg) ]
//! str(correlation_id)
//! str(created_at)        -- RFC 3339, UTC, microseconds, `Z` suffix
//! u32_be(field_count)
//! { str(key) str(value) } sorted by key
//!
//! str(s) = u32_be(len(s)) || utf8(s)
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::record::{PayloadFields, RecordType};

/// Domain separation tag for format v1.
const V1_DOMAIN: &str = "tessera.ledger.v1";

/// Canonical encoding version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalFormat {
    /// Length-prefixed binary encoding, fields sorted by key.
    V1,
}

impl CanonicalFormat {
    /// Format used for new appends.
    pub const CURRENT: Self = Self::V1;

    /// Encode the hashed content of a record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRecord`] if a string or the field count
    /// does not fit a 32-bit length prefix.
    pub fn encode(
        self,
        sequence_id: u64,
        record_type: &RecordType,
        correlation_id: &str,
        created_at: &DateTime<Utc>,
        fields: &PayloadFields,
    ) -> LedgerResult<Vec<u8>> {
        match self {
            Self::V1 => {
                let mut out = Encoder::default();
                out.put_str(V1_DOMAIN)?;
                out.put_u64(sequence_id);
                match record_type {
                    RecordType::Issue => out.put_str("issue")?,
                    RecordType::Cancel => out.put_str("cancel")?,
                    RecordType::Rectify { corrects } => {
                        out.put_str("rectify")?;
                        out.put_str(corrects)?;
                    },
                    RecordType::Event { kind } => {
                        out.put_str("event")?;
                        out.put_str(kind)?;
                    },
                }
                out.put_str(correlation_id)?;
                out.put_str(&created_at.to_rfc3339_opts(SecondsFormat::Micros, true))?;
                out.put_len(fields.len())?;
                // BTreeMap iteration is already sorted by key.
                for (key, value) in fields.iter() {
                    out.put_str(key)?;
                    out.put_str(value)?;
                }
                Ok(out.0)
            },
        }
    }
}

impl Default for CanonicalFormat {
    fn default() -> Self {
        Self::CURRENT
    }
}

#[derive(Default)]
struct Encoder(Vec<u8>);

impl Encoder {
    fn put_u64(&mut self, value: u64) {
        self.0.extend_from_slice(&value.to_be_bytes());
    }

    fn put_len(&mut self, len: usize) -> LedgerResult<()> {
        let len = u32::try_from(len).map_err(|_| {
            LedgerError::InvalidRecord(format!("length {len} exceeds canonical limit"))
        })?;
        self.0.extend_from_slice(&len.to_be_bytes());
        Ok(())
    }

    fn put_str(&mut self, s: &str) -> LedgerResult<()> {
        self.put_len(s.len())?;
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}
