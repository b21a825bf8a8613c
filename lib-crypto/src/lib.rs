//! Meridian crypto facade.
//!
//! Everything consensus-critical hashes with BLAKE3 and signs with Ed25519.
//! The rest of the workspace goes through this crate; no other module may
//! touch a hash or signature primitive directly, so swapping a primitive is
//! a one-crate change.

pub mod hashing;
pub mod keys;
pub mod merkle;

pub use hashing::{canonical_consensus_hash, hash_multiple};
pub use keys::{KeyError, PrivateKey, PublicKey, Signature};
pub use merkle::merkle_root;
