//! Authority request and response shapes.
//!
//! The request carries the batch's records in chain order. The response is
//! parsed into an [`AuthorityResponse`], a closed set of outcome kinds. The
//! rest of the crate only sees that type, so alternative wire encodings only
//! need another [`ResponseParser`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_ledger::{ContentHash, LedgerRecord, PayloadFields, RecordType};

use crate::batch::{BatchId, SubmissionBatch};
use crate::error::{RemisionError, SubmissionResult};

/// Identification of the submitting software, sent with every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareInfo {
    /// Registered software id.
    pub id: String,
    /// Software version.
    pub version: String,
}

impl Default for SoftwareInfo {
    fn default() -> Self {
        Self {
            id: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// One record as sent to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Position in the chain.
    pub sequence_id: u64,
    /// Identifier echoed back in per-record outcomes.
    pub correlation_id: String,
    /// Record kind.
    pub record_type: RecordType,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Business fields.
    pub fields: PayloadFields,
    /// Predecessor's link hash.
    pub previous_hash: ContentHash,
    /// This record's link hash.
    pub link_hash: ContentHash,
}

impl From<&LedgerRecord> for WireRecord {
    fn from(record: &LedgerRecord) -> Self {
        Self {
            sequence_id: record.sequence_id(),
            correlation_id: record.correlation_id().to_string(),
            record_type: record.record_type().clone(),
            created_at: record.created_at(),
            fields: record.fields().clone(),
            previous_hash: *record.previous_hash(),
            link_hash: *record.link_hash(),
        }
    }
}

/// Body of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// Batch id, used by the authority for idempotency.
    pub batch_id: BatchId,
    /// Submitting tenant.
    pub tenant: String,
    /// Ledger the records come from.
    pub ledger: String,
    /// Submitting software.
    pub software: SoftwareInfo,
    /// Records in sequence order.
    pub records: Vec<WireRecord>,
}

impl SubmissionRequest {
    /// Build the request for `batch`.
    #[must_use]
    pub fn from_batch(batch: &SubmissionBatch, software: &SoftwareInfo) -> Self {
        Self {
            batch_id: batch.id(),
            tenant: batch.chain().tenant.to_string(),
            ledger: batch.chain().ledger.to_string(),
            software: software.clone(),
            records: batch.records().iter().map(WireRecord::from).collect(),
        }
    }
}

/// The authority's verdict on one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordVerdict {
    /// Accepted.
    #[serde(alias = "Correcto")]
    Accepted,
    /// Accepted, with warnings the authority wants corrected later.
    #[serde(alias = "AceptadoConErrores")]
    AcceptedWithErrors,
    /// Rejected.
    #[serde(alias = "Incorrecto")]
    Rejected,
}

impl RecordVerdict {
    /// Whether the record counts as accepted.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted | Self::AcceptedWithErrors)
    }
}

/// Per-record outcome, keyed by correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// Correlation id of the record.
    pub correlation_id: String,
    /// Verdict.
    #[serde(rename = "status")]
    pub verdict: RecordVerdict,
    /// Machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Parsed authority response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityResponse {
    /// The submission was accepted as a whole.
    Accepted {
        /// Authority confirmation code.
        confirmation: Option<String>,
        /// Per-record detail, possibly partial or empty.
        records: Vec<RecordOutcome>,
    },
    /// Some records were accepted and some rejected.
    PartiallyAccepted {
        /// Authority confirmation code.
        confirmation: Option<String>,
        /// Per-record detail.
        records: Vec<RecordOutcome>,
    },
    /// The submission was refused before per-record evaluation.
    Rejected {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

/// Parser boundary between the wire encoding and [`AuthorityResponse`].
pub trait ResponseParser: Send + Sync {
    /// Parse a successful (2xx) response body.
    ///
    /// # Errors
    ///
    /// Returns [`RemisionError::InvalidResponse`] if the body does not match
    /// the expected shape.
    fn parse(&self, body: &[u8]) -> SubmissionResult<AuthorityResponse>;
}

/// JSON response format:
///
/// ```json
/// {
///   "status": "accepted" | "partially_accepted" | "rejected",
///   "confirmation": "CSV-123",
///   "code": "4102",
///   "message": "...",
///   "records": [
///     { "correlation_id": "F-1", "status": "accepted_with_errors", "code": "2000", "message": "..." }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResponseParser;

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum GlobalStatus {
    #[serde(alias = "Correcto")]
    Accepted,
    #[serde(alias = "ParcialmenteCorrecto")]
    PartiallyAccepted,
    #[serde(alias = "Incorrecto")]
    Rejected,
}

#[derive(Deserialize)]
struct JsonResponse {
    status: GlobalStatus,
    #[serde(default)]
    confirmation: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    records: Vec<RecordOutcome>,
}

impl ResponseParser for JsonResponseParser {
    fn parse(&self, body: &[u8]) -> SubmissionResult<AuthorityResponse> {
        let response: JsonResponse = serde_json::from_slice(body)
            .map_err(|e| RemisionError::InvalidResponse(e.to_string()))?;
        Ok(match response.status {
            GlobalStatus::Accepted => AuthorityResponse::Accepted {
                confirmation: response.confirmation,
                records: response.records,
            },
            GlobalStatus::PartiallyAccepted => AuthorityResponse::PartiallyAccepted {
                confirmation: response.confirmation,
                records: response.records,
            },
            GlobalStatus::Rejected => AuthorityResponse::Rejected {
                code: response.code.unwrap_or_else(|| "rejected".to_string()),
                message: response.message.unwrap_or_default(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial() {
        let body = br#"{
            "status": "partially_accepted",
            "confirmation": "CSV-9",
            "records": [
                {"correlation_id": "F-2", "status": "rejected", "code": "1100", "message": "bad tax id"},
                {"correlation_id": "F-1", "status": "accepted"}
            ]
        }"#;
        let AuthorityResponse::PartiallyAccepted {
            confirmation,
            records,
        } = JsonResponseParser.parse(body).unwrap()
        else {
            panic!("expected partial response");
        };
        assert_eq!(confirmation.as_deref(), Some("CSV-9"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].verdict, RecordVerdict::Rejected);
        assert_eq!(records[0].message.as_deref(), Some("bad tax id"));
    }

    #[test]
    fn test_parse_authority_tokens() {
        let body = br#"{
            "status": "ParcialmenteCorrecto",
            "records": [
                {"correlation_id": "F-1", "status": "AceptadoConErrores", "code": "2005"},
                {"correlation_id": "F-2", "status": "Incorrecto"}
            ]
        }"#;
        let AuthorityResponse::PartiallyAccepted { records, .. } =
            JsonResponseParser.parse(body).unwrap()
        else {
            panic!("expected partial response");
        };
        assert_eq!(records[0].verdict, RecordVerdict::AcceptedWithErrors);
        assert!(records[0].verdict.is_accepted());
        assert!(!records[1].verdict.is_accepted());
    }

    #[test]
    fn test_parse_global_rejection() {
        let body = br#"{"status": "rejected", "code": "4102", "message": "signature invalid"}"#;
        assert_eq!(
            JsonResponseParser.parse(body).unwrap(),
            AuthorityResponse::Rejected {
                code: "4102".into(),
                message: "signature invalid".into(),
            }
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            JsonResponseParser.parse(b"<html>"),
            Err(RemisionError::InvalidResponse(_))
        ));
        assert!(JsonResponseParser.parse(br#"{"status": "maybe"}"#).is_err());
    }
}
