//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_crypto::prelude::*;` to import all essential types.

// Errors
pub use crate::{CryptoError, CryptoResult};

// Hashing
pub use crate::ContentHash;

// Encryption
pub use crate::{AuthenticatedPayload, NONCE_LEN, TAG_LEN};

// Keys
pub use crate::{KeyId, KeyProvider, SecretKey, StaticKeyProvider};
