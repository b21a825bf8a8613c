//! Ed25519 key material and signatures.
//!
//! Wraps `ed25519-dalek` behind fixed-size serde-friendly newtypes. A
//! [`Signature`] records the signer's public key next to the signature bytes
//! so verification against a candidate authority key needs no recovery step.

use lib_types::Digest;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("malformed public key bytes")]
    MalformedPublicKey,
    #[error("signature verification failed")]
    BadSignature,
}

/// 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Ed25519 signing key.
pub struct PrivateKey {
    inner: ed25519_dalek::SigningKey,
}

impl PrivateKey {
    /// Generate from OS entropy. Test and tooling use only; consensus code
    /// never generates keys.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self { inner: ed25519_dalek::SigningKey::generate(&mut rng) }
    }

    /// Deterministic key from a 32-byte seed. Handy for reproducible test
    /// fixtures and genesis tooling.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { inner: ed25519_dalek::SigningKey::from_bytes(&seed) }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.inner.verifying_key().to_bytes())
    }

    /// Sign a digest, embedding the public key in the result.
    pub fn sign(&self, digest: &Digest) -> Signature {
        use ed25519_dalek::Signer;
        let sig = self.inner.sign(digest.as_bytes());
        Signature { key: self.public_key(), bytes: sig.to_bytes() }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.public_key())
    }
}

/// A signature plus the public key that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub key: PublicKey,
    #[serde(with = "serde_sig_bytes")]
    pub bytes: [u8; 64],
}

impl Signature {
    /// Verify this signature over `digest` against its embedded key.
    pub fn verify(&self, digest: &Digest) -> Result<(), KeyError> {
        use ed25519_dalek::Verifier;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.key.0)
            .map_err(|_| KeyError::MalformedPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&self.bytes);
        key.verify(digest.as_bytes(), &sig).map_err(|_| KeyError::BadSignature)
    }

    /// The key this signature claims to come from. Only meaningful once
    /// `verify` has passed.
    pub fn signer(&self) -> PublicKey {
        self.key
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self { key: PublicKey::default(), bytes: [0u8; 64] }
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(by {})", self.key)
    }
}

mod serde_sig_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], ser: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&bytes[..], ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 64], D::Error> {
        let v: Vec<u8> = Deserialize::deserialize(de)?;
        v.try_into().map_err(|_| D::Error::custom("expected 64 signature bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::canonical_consensus_hash;

    #[test]
    fn sign_and_verify() {
        let key = PrivateKey::from_seed([1u8; 32]);
        let digest = canonical_consensus_hash(b"payload");
        let sig = key.sign(&digest);
        assert_eq!(sig.signer(), key.public_key());
        assert!(sig.verify(&digest).is_ok());
    }

    #[test]
    fn tampered_digest_fails() {
        let key = PrivateKey::from_seed([2u8; 32]);
        let sig = key.sign(&canonical_consensus_hash(b"payload"));
        assert_eq!(
            sig.verify(&canonical_consensus_hash(b"other")),
            Err(KeyError::BadSignature)
        );
    }

    #[test]
    fn seeded_keys_are_reproducible() {
        let a = PrivateKey::from_seed([9u8; 32]);
        let b = PrivateKey::from_seed([9u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }
}
