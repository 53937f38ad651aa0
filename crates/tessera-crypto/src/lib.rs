//! Tessera Crypto - primitives for the tamper-evident ledger.
//!
//! This crate provides:
//! - SHA-256 content hashing for ledger chain links
//! - AES-256-GCM authenticated payloads with strict nonce/tag sizes
//! - Symmetric keys with secure memory handling and versioned key ids
//!
//! # Example
//!
//! ```
//! use tessera_crypto::{AuthenticatedPayload, ContentHash, KeyId, SecretKey};
//!
//! let key = SecretKey::generate();
//! let key_id = KeyId::new("messages", 1);
//!
//! let payload = AuthenticatedPayload::encrypt(b"ledger entry", &key, &key_id).unwrap();
//! let plaintext = payload.decrypt(&key).unwrap();
//! assert_eq!(plaintext.as_slice(), b"ledger entry");
//!
//! let hash = ContentHash::hash(b"ledger entry");
//! println!("Hash: {}", hash.to_hex());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod aead;
mod error;
mod hash;
mod key;

pub use aead::{AuthenticatedPayload, NONCE_LEN, TAG_LEN};
pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use key::{KeyId, KeyProvider, SecretKey, StaticKeyProvider};
