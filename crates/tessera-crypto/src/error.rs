//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
///
/// Messages never carry key material or plaintext.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Invalid AEAD nonce length.
    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Invalid AEAD tag length.
    #[error("invalid tag length: expected {expected}, got {actual}")]
    InvalidTagLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Authentication tag did not match; no plaintext is returned.
    #[error("decryption failed: payload could not be authenticated")]
    AuthenticationFailed,

    /// The payload was sealed under a different key id.
    #[error("key id mismatch: payload sealed under {expected}, got {actual}")]
    KeyMismatch {
        /// Key id recorded in the payload.
        expected: String,
        /// Key id supplied by the caller.
        actual: String,
    },

    /// No key registered under the requested id.
    #[error("unknown key id: {0}")]
    UnknownKey(String),

    /// A key id was registered twice with different bytes.
    #[error("key id already registered: {0}")]
    KeyAlreadyRegistered(String),

    /// Invalid key id string.
    #[error("invalid key id: {0}")]
    InvalidKeyId(String),

    /// Invalid hex encoding.
    #[error("invalid hex encoding")]
    InvalidHexEncoding,

    /// Invalid base64 encoding.
    #[error("invalid base64 encoding")]
    InvalidBase64Encoding,

    /// Serialization of a payload envelope failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
