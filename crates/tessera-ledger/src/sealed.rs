//! Encrypted-at-rest record fields.
//!
//! A sealed field stores an [`AuthenticatedPayload`] in text form behind the
//! [`SEALED_PREFIX`]. The sealed text is what gets hashed, so the chain
//! covers the ciphertext and any tampering with it is detected both by the
//! verifier and by AEAD authentication on open.

use tessera_crypto::{AuthenticatedPayload, KeyProvider};
use zeroize::Zeroizing;

use crate::error::{LedgerError, LedgerResult};
use crate::record::{LedgerRecord, RecordDraft};

/// Marker prefix of sealed field values.
pub const SEALED_PREFIX: &str = "sealed:";

impl RecordDraft {
    /// Add a field whose value is encrypted under the current version of
    /// `key_name`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Crypto`] if the key cannot be found or
    /// encryption fails.
    pub fn with_sealed_field(
        self,
        name: impl Into<String>,
        plaintext: &[u8],
        keys: &dyn KeyProvider,
        key_name: &str,
    ) -> LedgerResult<Self> {
        let key_id = keys.current(key_name)?;
        let payload = {
            let key = keys.key(&key_id)?;
            AuthenticatedPayload::encrypt(plaintext, &key, &key_id)?
        };
        let value = format!("{SEALED_PREFIX}{}", payload.to_base64()?);
        Ok(self.with_field(name, value))
    }
}

impl LedgerRecord {
    /// Whether `name` holds a sealed value.
    #[must_use]
    pub fn is_sealed(&self, name: &str) -> bool {
        self.fields()
            .get(name)
            .is_some_and(|v| v.starts_with(SEALED_PREFIX))
    }

    /// Decrypt a sealed field with the key it was sealed under.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRecord`] if the field is missing or not
    /// sealed, and [`LedgerError::Crypto`] if the key is unknown or the
    /// payload fails authentication.
    pub fn open_field(&self, name: &str, keys: &dyn KeyProvider) -> LedgerResult<Zeroizing<Vec<u8>>> {
        let value = self
            .fields()
            .get(name)
            .ok_or_else(|| LedgerError::InvalidRecord(format!("no field named {name:?}")))?;
        let encoded = value
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| LedgerError::InvalidRecord(format!("field {name:?} is not sealed")))?;
        let payload = AuthenticatedPayload::from_base64(encoded)?;
        let key = keys.key(payload.key_id())?;
        Ok(payload.decrypt(&key)?)
    }
}
