//! Merkle root over transaction ids.
//!
//! Leaves are 20-byte transaction ids; interior nodes hash the concatenation
//! of their children. An odd node at any level is paired with itself, and an
//! empty set commits to the zero digest.

use crate::hashing::hash_multiple;
use lib_types::{Digest, TransactionId};

pub fn merkle_root(ids: &[TransactionId]) -> Digest {
    if ids.is_empty() {
        return Digest::zero();
    }

    let mut level: Vec<Digest> = ids
        .iter()
        .map(|id| hash_multiple(&[id.as_bytes()]))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            next.push(hash_multiple(&[pair[0].as_bytes(), right.as_bytes()]));
        }
        level = next;
    }
    level[0]
}
