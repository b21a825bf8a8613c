//! Canonical wire encoding.
//!
//! One bincode configuration for every consensus byte: fixed-width
//! little-endian integers, length-prefixed sequences, trailing bytes
//! rejected. Block ids, transaction ids, Merkle roots, and size limits are
//! all computed over these bytes, so nothing else in the workspace may
//! construct its own bincode options.

use crate::error::{ChainError, ChainResult};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_little_endian()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Canonical bytes of a value.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    // Serialization of in-memory state cannot fail for our closed type set.
    options()
        .serialize(value)
        .expect("canonical serialization is infallible for chain types")
}

/// Canonical encoded size without materialising the bytes.
pub fn canonical_size<T: Serialize>(value: &T) -> u64 {
    options()
        .serialized_size(value)
        .expect("canonical serialization is infallible for chain types")
}

/// Decode a value from canonical bytes.
pub fn from_canonical_bytes<T: DeserializeOwned>(bytes: &[u8]) -> ChainResult<T> {
    options()
        .deserialize(bytes)
        .map_err(|e| ChainError::structural(format!("canonical decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
        b: Vec<u16>,
        c: String,
    }

    #[test]
    fn round_trip() {
        let v = Sample { a: 0xAABB_CCDD, b: vec![1, 2, 3], c: "meridian".into() };
        let bytes = canonical_bytes(&v);
        assert_eq!(from_canonical_bytes::<Sample>(&bytes).unwrap(), v);
        assert_eq!(bytes.len() as u64, canonical_size(&v));
    }

    #[test]
    fn integers_are_fixed_width_little_endian() {
        let bytes = canonical_bytes(&0x0102_0304u32);
        assert_eq!(bytes, vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn sequence_lengths_are_fixed_u64_prefixes() {
        let v: Vec<u8> = vec![1, 2, 3];
        let bytes = canonical_bytes(&v);
        assert_eq!(&bytes[..8], &3u64.to_le_bytes());
        assert_eq!(bytes.len(), 8 + 3);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = canonical_bytes(&7u32);
        bytes.push(0);
        assert!(from_canonical_bytes::<u32>(&bytes).is_err());
    }
}
