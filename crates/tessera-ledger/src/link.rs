//! Hash chain links.

use tessera_crypto::ContentHash;

/// Computes and checks single links of a hash chain.
///
/// `link_hash = SHA-256(previous_hash || canonical_bytes)`
///
/// The first record of every chain uses [`ChainLink::GENESIS`] (32 zero
/// bytes) as its previous hash. A computed link equal to the sentinel is
/// refused at append time, so the sentinel never appears mid-chain.
#[derive(Debug, Clone, Copy)]
pub struct ChainLink;

impl ChainLink {
    /// Previous hash of the first record in a chain.
    pub const GENESIS: ContentHash = ContentHash::zero();

    /// Compute the link hash for a record.
    #[must_use]
    pub fn compute(previous_hash: &ContentHash, canonical: &[u8]) -> ContentHash {
        ContentHash::hash_multi(&[previous_hash.as_bytes(), canonical])
    }

    /// Whether `link_hash` is the link of `canonical` after `previous_hash`.
    #[must_use]
    pub fn validate(previous_hash: &ContentHash, canonical: &[u8], link_hash: &ContentHash) -> bool {
        Self::compute(previous_hash, canonical) == *link_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_depends_on_previous_hash() {
        let a = ChainLink::compute(&ChainLink::GENESIS, b"record");
        let b = ChainLink::compute(&ContentHash::hash(b"other"), b"record");
        assert_ne!(a, b);
    }

    #[test]
    fn test_link_is_hash_of_concatenation() {
        let prev = ContentHash::hash(b"prev");
        let mut joined = prev.as_bytes().to_vec();
        joined.extend_from_slice(b"record");
        assert_eq!(ChainLink::compute(&prev, b"record"), ContentHash::hash(&joined));
    }

    #[test]
    fn test_validate() {
        let link = ChainLink::compute(&ChainLink::GENESIS, b"record");
        assert!(ChainLink::validate(&ChainLink::GENESIS, b"record", &link));
        assert!(!ChainLink::validate(&ChainLink::GENESIS, b"recorD", &link));
        assert!(!ChainLink::GENESIS.to_hex().is_empty());
        assert!(ChainLink::GENESIS.is_zero());
    }
}
