//! AES-256-GCM authenticated payloads.
//!
//! An [`AuthenticatedPayload`] is immutable once constructed and can only be
//! constructed with a 96-bit nonce and a 128-bit tag. The key id is bound to
//! the ciphertext as associated data, so a payload presented under another
//! key id fails authentication even if the key bytes were reused.

use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce, Tag};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::key::{KeyId, SecretKey};

/// Required nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Required authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Ciphertext with its nonce, tag and the id of the key that sealed it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PayloadEnvelope", into = "PayloadEnvelope")]
pub struct AuthenticatedPayload {
    ciphertext: Vec<u8>,
    nonce: [u8; NONCE_LEN],
    tag: [u8; TAG_LEN],
    key_id: KeyId,
}

impl AuthenticatedPayload {
    /// Assemble a payload from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidNonceLength`] unless the nonce is exactly
    /// 12 bytes, and [`CryptoError::InvalidTagLength`] unless the tag is
    /// exactly 16 bytes.
    pub fn new(
        ciphertext: Vec<u8>,
        nonce: &[u8],
        tag: &[u8],
        key_id: KeyId,
    ) -> CryptoResult<Self> {
        let nonce =
            <[u8; NONCE_LEN]>::try_from(nonce).map_err(|_| CryptoError::InvalidNonceLength {
                expected: NONCE_LEN,
                actual: nonce.len(),
            })?;
        let tag = <[u8; TAG_LEN]>::try_from(tag).map_err(|_| CryptoError::InvalidTagLength {
            expected: TAG_LEN,
            actual: tag.len(),
        })?;
        Ok(Self {
            ciphertext,
            nonce,
            tag,
            key_id,
        })
    }

    /// Encrypt `plaintext` under `key` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if the cipher rejects the input.
    pub fn encrypt(plaintext: &[u8], key: &SecretKey, key_id: &KeyId) -> CryptoResult<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        let aad = key_id.to_string();
        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad.as_bytes(), &mut buffer)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Self::new(buffer, &nonce, tag.as_slice(), key_id.clone())
    }

    /// Decrypt and authenticate.
    ///
    /// Fails closed: on any tag mismatch no plaintext is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AuthenticationFailed`] if the ciphertext, nonce,
    /// tag, key or key id do not match.
    pub fn decrypt(&self, key: &SecretKey) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        let aad = self.key_id.to_string();
        let mut buffer = Zeroizing::new(self.ciphertext.clone());
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&self.nonce),
                aad.as_bytes(),
                buffer.as_mut_slice(),
                Tag::from_slice(&self.tag),
            )
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        Ok(buffer)
    }

    /// Decrypt after checking that `key_id` is the id this payload was sealed under.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyMismatch`] on a different id, otherwise as
    /// [`decrypt`](Self::decrypt).
    pub fn decrypt_with_id(
        &self,
        key: &SecretKey,
        key_id: &KeyId,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if key_id != &self.key_id {
            return Err(CryptoError::KeyMismatch {
                expected: self.key_id.to_string(),
                actual: key_id.to_string(),
            });
        }
        self.decrypt(key)
    }

    /// The ciphertext bytes.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The 12-byte nonce.
    #[must_use]
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// The 16-byte authentication tag.
    #[must_use]
    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    /// Id of the key this payload was sealed under.
    #[must_use]
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// Compact text form (base64 of the JSON envelope), suitable for storing
    /// in a string field.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Serialization`] if the envelope cannot be encoded.
    pub fn to_base64(&self) -> CryptoResult<String> {
        let json =
            serde_json::to_vec(self).map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }

    /// Parse the form produced by [`to_base64`](Self::to_base64).
    ///
    /// Length invariants are enforced during parsing.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidBase64Encoding`] or a construction error.
    pub fn from_base64(s: &str) -> CryptoResult<Self> {
        let json = STANDARD
            .decode(s)
            .map_err(|_| CryptoError::InvalidBase64Encoding)?;
        let envelope: PayloadEnvelope =
            serde_json::from_slice(&json).map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Self::try_from(envelope)
    }
}

impl std::fmt::Debug for AuthenticatedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedPayload")
            .field("key_id", &self.key_id)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

/// Serialized form of a payload.
#[derive(Serialize, Deserialize)]
struct PayloadEnvelope {
    key_id: KeyId,
    nonce: String,
    tag: String,
    ciphertext: String,
}

impl TryFrom<PayloadEnvelope> for AuthenticatedPayload {
    type Error = CryptoError;

    fn try_from(envelope: PayloadEnvelope) -> Result<Self, Self::Error> {
        let decode = |s: &str| {
            STANDARD
                .decode(s)
                .map_err(|_| CryptoError::InvalidBase64Encoding)
        };
        Self::new(
            decode(&envelope.ciphertext)?,
            &decode(&envelope.nonce)?,
            &decode(&envelope.tag)?,
            envelope.key_id,
        )
    }
}

impl From<AuthenticatedPayload> for PayloadEnvelope {
    fn from(payload: AuthenticatedPayload) -> Self {
        Self {
            nonce: STANDARD.encode(payload.nonce),
            tag: STANDARD.encode(payload.tag),
            ciphertext: STANDARD.encode(&payload.ciphertext),
            key_id: payload.key_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_id() -> KeyId {
        KeyId::new("messages", 1)
    }

    #[test]
    fn test_nonce_length_invariant() {
        let tag = [0u8; TAG_LEN];
        for len in [0, 11, 13, 24] {
            let err = AuthenticatedPayload::new(vec![1, 2, 3], &vec![0u8; len], &tag, key_id())
                .unwrap_err();
            assert!(matches!(
                err,
                CryptoError::InvalidNonceLength { expected: 12, actual } if actual == len
            ));
        }
    }

    #[test]
    fn test_tag_length_invariant() {
        let nonce = [0u8; NONCE_LEN];
        for len in [0, 15, 17, 32] {
            let err = AuthenticatedPayload::new(vec![1, 2, 3], &nonce, &vec![0u8; len], key_id())
                .unwrap_err();
            assert!(matches!(
                err,
                CryptoError::InvalidTagLength { expected: 16, actual } if actual == len
            ));
        }
    }

    #[test]
    fn test_exact_lengths_accepted() {
        let payload =
            AuthenticatedPayload::new(vec![], &[7u8; NONCE_LEN], &[9u8; TAG_LEN], key_id())
                .unwrap();
        assert_eq!(payload.nonce(), &[7u8; NONCE_LEN]);
        assert_eq!(payload.tag(), &[9u8; TAG_LEN]);
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = SecretKey::generate();
        let payload = AuthenticatedPayload::encrypt(b"secure message", &key, &key_id()).unwrap();
        assert_ne!(payload.ciphertext(), b"secure message");
        assert_eq!(payload.decrypt(&key).unwrap().as_slice(), b"secure message");
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let payload =
            AuthenticatedPayload::encrypt(b"secure message", &SecretKey::generate(), &key_id())
                .unwrap();
        let err = payload.decrypt(&SecretKey::generate()).unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailed));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = SecretKey::generate();
        let payload = AuthenticatedPayload::encrypt(b"secure message", &key, &key_id()).unwrap();

        let mut ciphertext = payload.ciphertext().to_vec();
        ciphertext[0] ^= 0x01;
        let tampered =
            AuthenticatedPayload::new(ciphertext, payload.nonce(), payload.tag(), key_id())
                .unwrap();
        assert!(tampered.decrypt(&key).is_err());

        let mut tag = *payload.tag();
        tag[15] ^= 0x80;
        let tampered =
            AuthenticatedPayload::new(payload.ciphertext().to_vec(), payload.nonce(), &tag, key_id())
                .unwrap();
        assert!(tampered.decrypt(&key).is_err());
    }

    #[test]
    fn test_key_id_is_authenticated() {
        let key = SecretKey::generate();
        let payload = AuthenticatedPayload::encrypt(b"secure message", &key, &key_id()).unwrap();
        let relabelled = AuthenticatedPayload::new(
            payload.ciphertext().to_vec(),
            payload.nonce(),
            payload.tag(),
            KeyId::new("messages", 2),
        )
        .unwrap();
        assert!(relabelled.decrypt(&key).is_err());

        let err = payload
            .decrypt_with_id(&key, &KeyId::new("messages", 2))
            .unwrap_err();
        assert!(matches!(err, CryptoError::KeyMismatch { .. }));
    }

    #[test]
    fn test_base64_form_enforces_lengths() {
        let key = SecretKey::generate();
        let payload = AuthenticatedPayload::encrypt(b"hello", &key, &key_id()).unwrap();
        let encoded = payload.to_base64().unwrap();
        let decoded = AuthenticatedPayload::from_base64(&encoded).unwrap();
        assert_eq!(decoded, payload);

        let bad = serde_json::json!({
            "key_id": "messages:v1",
            "nonce": STANDARD.encode([0u8; 11]),
            "tag": STANDARD.encode([0u8; 16]),
            "ciphertext": STANDARD.encode(b"x"),
        });
        let bad = STANDARD.encode(serde_json::to_vec(&bad).unwrap());
        assert!(matches!(
            AuthenticatedPayload::from_base64(&bad),
            Err(CryptoError::InvalidNonceLength { .. })
        ));
    }

    #[test]
    fn test_debug_hides_ciphertext() {
        let payload =
            AuthenticatedPayload::encrypt(b"hello", &SecretKey::generate(), &key_id()).unwrap();
        let rendered = format!("{payload:?}");
        assert!(rendered.contains("messages:v1"));
        assert!(!rendered.contains("nonce"));
    }
}
