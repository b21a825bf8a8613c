//! Signed blocks.
//!
//! A block's id hashes the signed header (transactions are committed to via
//! the Merkle root), then splices the big-endian block number over the
//! first four bytes so ids sort by height. The witness signs the header
//! digest computed before the signature field is filled in.

use crate::protocol::transaction::ProcessedTransaction;
use crate::serial;
use lib_crypto::{canonical_consensus_hash, merkle_root, PrivateKey, PublicKey, Signature};
use lib_types::{BlockId, Digest, TimePointSec, WitnessId};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignedBlock {
    pub previous: BlockId,
    pub timestamp: TimePointSec,
    pub witness: WitnessId,
    pub transaction_merkle_root: Digest,
    pub witness_signature: Signature,
    pub transactions: Vec<ProcessedTransaction>,

    #[serde(skip)]
    pub cached_id: OnceCell<BlockId>,
    #[serde(skip)]
    pub cached_merkle: OnceCell<Digest>,
}

/// Header fields without the signature; what the witness signs.
#[derive(Serialize)]
struct HeaderRef<'a> {
    previous: &'a BlockId,
    timestamp: TimePointSec,
    witness: WitnessId,
    transaction_merkle_root: &'a Digest,
}

/// Signed header; what the block id hashes.
#[derive(Serialize)]
struct SignedHeaderRef<'a> {
    previous: &'a BlockId,
    timestamp: TimePointSec,
    witness: WitnessId,
    transaction_merkle_root: &'a Digest,
    witness_signature: &'a Signature,
}

impl SignedBlock {
    /// Height of this block: one past its parent.
    pub fn block_num(&self) -> u32 {
        self.previous.num() + 1
    }

    fn header_ref(&self) -> HeaderRef<'_> {
        HeaderRef {
            previous: &self.previous,
            timestamp: self.timestamp,
            witness: self.witness,
            transaction_merkle_root: &self.transaction_merkle_root,
        }
    }

    /// Digest the producing witness signs.
    pub fn signing_digest(&self) -> Digest {
        canonical_consensus_hash(&serial::canonical_bytes(&self.header_ref()))
    }

    /// Memoised block id.
    pub fn id(&self) -> BlockId {
        *self.cached_id.get_or_init(|| {
            let signed = SignedHeaderRef {
                previous: &self.previous,
                timestamp: self.timestamp,
                witness: self.witness,
                transaction_merkle_root: &self.transaction_merkle_root,
                witness_signature: &self.witness_signature,
            };
            let digest = canonical_consensus_hash(&serial::canonical_bytes(&signed));
            BlockId::from_digest(&digest, self.block_num())
        })
    }

    /// Memoised Merkle root over the contained transaction ids.
    pub fn calculate_merkle_root(&self) -> Digest {
        *self.cached_merkle.get_or_init(|| {
            let ids: Vec<_> = self.transactions.iter().map(|tx| tx.id()).collect();
            merkle_root(&ids)
        })
    }

    /// Sign the header with the producing witness key. Must be the last
    /// header mutation: the id commits to the signature.
    pub fn sign(&mut self, key: &PrivateKey) {
        let digest = self.signing_digest();
        self.witness_signature = key.sign(&digest);
        self.cached_id = OnceCell::new();
    }

    /// Check the header signature against the scheduled witness key.
    pub fn validate_signee(&self, expected: &PublicKey) -> bool {
        self.witness_signature.signer() == *expected
            && self.witness_signature.verify(&self.signing_digest()).is_ok()
    }

    /// The key the header signature claims; verified, or `None` when the
    /// signature does not even match its own embedded key.
    pub fn signee(&self) -> Option<PublicKey> {
        self.witness_signature
            .verify(&self.signing_digest())
            .ok()
            .map(|_| self.witness_signature.signer())
    }
}

impl PartialEq for SignedBlock {
    fn eq(&self, other: &Self) -> bool {
        self.previous == other.previous
            && self.timestamp == other.timestamp
            && self.witness == other.witness
            && self.transaction_merkle_root == other.transaction_merkle_root
            && self.witness_signature == other.witness_signature
            && self.transactions == other.transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(prev_num: u32) -> SignedBlock {
        let mut prev_bytes = [0x22u8; 20];
        prev_bytes[..4].copy_from_slice(&prev_num.to_be_bytes());
        SignedBlock {
            previous: BlockId(prev_bytes),
            timestamp: TimePointSec::new(100),
            witness: WitnessId(1),
            ..Default::default()
        }
    }

    #[test]
    fn block_num_is_parent_plus_one() {
        assert_eq!(block(41).block_num(), 42);
    }

    #[test]
    fn id_embeds_height() {
        let b = block(9);
        assert_eq!(b.id().num(), 10);
    }

    #[test]
    fn sign_then_verify() {
        let key = PrivateKey::from_seed([3u8; 32]);
        let mut b = block(0);
        b.sign(&key);
        assert!(b.validate_signee(&key.public_key()));
        assert_eq!(b.signee(), Some(key.public_key()));

        let other = PrivateKey::from_seed([4u8; 32]);
        assert!(!b.validate_signee(&other.public_key()));
    }

    #[test]
    fn id_commits_to_signature() {
        let mut b = block(0);
        let unsigned = b.id();
        b.sign(&PrivateKey::from_seed([3u8; 32]));
        assert_ne!(b.id(), unsigned);
    }

    #[test]
    fn serialization_round_trip() {
        let mut b = block(7);
        b.sign(&PrivateKey::from_seed([6u8; 32]));
        let bytes = serial::canonical_bytes(&b);
        let decoded: SignedBlock = serial::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(decoded, b);
        assert_eq!(serial::canonical_bytes(&decoded), bytes);
        assert_eq!(decoded.id(), b.id());
    }
}
