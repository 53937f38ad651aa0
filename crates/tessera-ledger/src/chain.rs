//! Chain identity: one hash chain per (tenant, ledger) pair.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Maximum tenant id length.
const MAX_TENANT_LEN: usize = 64;

/// Tenant identifier.
///
/// Restricted to ASCII alphanumerics, `-`, `_` and `.` so it can name
/// directories in file-backed storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRecord`] if the id is empty, too long,
    /// or contains characters outside `[A-Za-z0-9._-]`.
    pub fn new(id: impl Into<String>) -> LedgerResult<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= MAX_TENANT_LEN
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(Self(id))
        } else {
            Err(LedgerError::InvalidRecord(format!("invalid tenant id: {id:?}")))
        }
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

/// Which ledger of a tenant a chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Issued invoices (issue / cancel / rectify records).
    Invoices,
    /// Secure message audit trail.
    Messages,
}

impl LedgerKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invoices => "invoices",
            Self::Messages => "messages",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoices" => Ok(Self::Invoices),
            "messages" => Ok(Self::Messages),
            other => Err(LedgerError::InvalidRecord(format!(
                "unknown ledger kind: {other}"
            ))),
        }
    }
}

/// Identity of a single hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainKey {
    /// Owning tenant.
    pub tenant: TenantId,
    /// Ledger within the tenant.
    pub ledger: LedgerKind,
}

impl ChainKey {
    /// Create a chain key.
    #[must_use]
    pub fn new(tenant: TenantId, ledger: LedgerKind) -> Self {
        Self { tenant, ledger }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_validation() {
        assert!(TenantId::new("acme-01").is_ok());
        assert!(TenantId::new("acme.es").is_ok());
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("../etc").is_err());
        assert!(TenantId::new(".hidden").is_err());
        assert!(TenantId::new("a b").is_err());
        assert!(TenantId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn test_tenant_id_serde_validates() {
        assert!(serde_json::from_str::<TenantId>("\"acme\"").is_ok());
        assert!(serde_json::from_str::<TenantId>("\"a/b\"").is_err());
    }

    #[test]
    fn test_ledger_kind_parse() {
        assert_eq!("invoices".parse::<LedgerKind>().unwrap(), LedgerKind::Invoices);
        assert_eq!("messages".parse::<LedgerKind>().unwrap(), LedgerKind::Messages);
        assert!("orders".parse::<LedgerKind>().is_err());
    }

    #[test]
    fn test_chain_key_display() {
        let chain = ChainKey::new(TenantId::new("acme").unwrap(), LedgerKind::Messages);
        assert_eq!(chain.to_string(), "acme/messages");
    }
}
