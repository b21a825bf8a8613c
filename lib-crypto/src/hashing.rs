//! Canonical consensus hashing.
//!
//! **BLAKE3 is the canonical hash function for all consensus-critical data**:
//! block headers, transaction bodies, Merkle interior nodes. Using an
//! alternate hash for any of these produces mismatched commitments between
//! peers, so none is offered.

use lib_types::Digest;

/// Computes the canonical consensus hash of `data`.
pub fn canonical_consensus_hash(data: &[u8]) -> Digest {
    Digest::new(blake3::hash(data).into())
}

/// Hash several segments as one message without concatenating buffers.
pub fn hash_multiple(segments: &[&[u8]]) -> Digest {
    let mut hasher = blake3::Hasher::new();
    for segment in segments {
        hasher.update(segment);
    }
    Digest::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let data = b"consensus-critical block header";
        assert_eq!(canonical_consensus_hash(data), canonical_consensus_hash(data));
    }

    #[test]
    fn multiple_segments_equal_concatenation() {
        assert_eq!(
            hash_multiple(&[b"ab", b"cd"]),
            canonical_consensus_hash(b"abcd")
        );
    }
}
