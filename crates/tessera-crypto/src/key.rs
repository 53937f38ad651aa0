//! Symmetric keys, versioned key ids, and key providers.
//!
//! Keys are rotated by registering a new version under the same name;
//! the bytes behind an existing [`KeyId`] never change.

use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// AES-256 key length in bytes.
pub(crate) const KEY_LEN: usize = 32;

/// A 256-bit symmetric key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Generate a random key from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array = <[u8; KEY_LEN]>::try_from(bytes).map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Decode a key from hex (e.g. from an environment variable).
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not hex or not 32 bytes.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = zeroize::Zeroizing::new(
            hex::decode(s.trim()).map_err(|_| CryptoError::InvalidHexEncoding)?,
        );
        Self::from_slice(&bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Identifier of a key version, rendered as `name:vN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyId {
    name: String,
    version: u32,
}

impl KeyId {
    /// Create a key id.
    #[must_use]
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Key name (shared by all versions).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:v{}", self.name, self.version)
    }
}

impl FromStr for KeyId {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s
            .rsplit_once(":v")
            .ok_or_else(|| CryptoError::InvalidKeyId(s.to_string()))?;
        if name.is_empty() {
            return Err(CryptoError::InvalidKeyId(s.to_string()));
        }
        let version = version
            .parse()
            .map_err(|_| CryptoError::InvalidKeyId(s.to_string()))?;
        Ok(Self::new(name, version))
    }
}

impl TryFrom<String> for KeyId {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyId> for String {
    fn from(id: KeyId) -> Self {
        id.to_string()
    }
}

/// Source of symmetric keys by id.
///
/// Returned keys are owned copies; callers drop them (and thereby zeroize
/// them) as soon as the operation completes.
pub trait KeyProvider: Send + Sync {
    /// Fetch the key registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownKey`] if no such key exists.
    fn key(&self, id: &KeyId) -> CryptoResult<SecretKey>;

    /// The newest version registered under `name`, used for new encryptions.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownKey`] if no version exists.
    fn current(&self, name: &str) -> CryptoResult<KeyId>;
}

/// In-process key provider backed by a concurrent map.
#[derive(Default)]
pub struct StaticKeyProvider {
    keys: DashMap<KeyId, SecretKey>,
}

impl StaticKeyProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key version.
    ///
    /// Registering the same bytes twice is a no-op; registering different
    /// bytes under an existing id is refused.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyAlreadyRegistered`] on a conflicting id.
    pub fn register(&self, id: KeyId, key: SecretKey) -> CryptoResult<()> {
        match self.keys.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                if *existing.get() == key {
                    Ok(())
                } else {
                    Err(CryptoError::KeyAlreadyRegistered(existing.key().to_string()))
                }
            },
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(key);
                Ok(())
            },
        }
    }

    /// Number of registered key versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyProvider for StaticKeyProvider {
    fn key(&self, id: &KeyId) -> CryptoResult<SecretKey> {
        self.keys
            .get(id)
            .map(|k| k.value().clone())
            .ok_or_else(|| CryptoError::UnknownKey(id.to_string()))
    }

    fn current(&self, name: &str) -> CryptoResult<KeyId> {
        self.keys
            .iter()
            .filter(|entry| entry.key().name() == name)
            .map(|entry| entry.key().clone())
            .max_by_key(KeyId::version)
            .ok_or_else(|| CryptoError::UnknownKey(name.to_string()))
    }
}

impl fmt::Debug for StaticKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeyProvider")
            .field("keys", &self.keys.len())
            .finish()
    }
}
