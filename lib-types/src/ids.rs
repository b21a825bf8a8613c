//! Canonical identifier types for consensus state.
//!
//! Rule: no String identifiers in consensus state. Ever.
//!
//! Every live object is addressed by a typed 64-bit instance id; cross
//! references between objects are by id and are resolved through the object
//! store, so no cyclic ownership exists at the language level.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of object table tags. The numbering is part of the protocol
/// and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObjectType {
    Account = 0,
    Asset = 1,
    Witness = 2,
    LimitOrder = 3,
    Proposal = 4,
    WithdrawPermission = 5,
    Transaction = 6,
    BlockSummary = 7,
    GlobalProperty = 8,
    DynamicGlobalProperty = 9,
}

/// Fully qualified object id: table tag plus 64-bit instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub ty: ObjectType,
    pub instance: u64,
}

impl ObjectId {
    pub const fn new(ty: ObjectType, instance: u64) -> Self {
        Self { ty, instance }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.ty as u8, self.instance)
    }
}

macro_rules! typed_id {
    ($(#[$doc:meta])* $name:ident, $ty:expr) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
            Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(instance: u64) -> Self {
                Self(instance)
            }

            pub const fn object_id(self) -> ObjectId {
                ObjectId::new($ty, self.0)
            }
        }

        impl From<$name> for ObjectId {
            fn from(id: $name) -> ObjectId {
                id.object_id()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.object_id(), f)
            }
        }
    };
}

typed_id!(
    /// Account table instance id.
    AccountId,
    ObjectType::Account
);
typed_id!(
    /// Asset table instance id. Instance 0 is the core asset.
    AssetId,
    ObjectType::Asset
);
typed_id!(
    /// Witness table instance id.
    WitnessId,
    ObjectType::Witness
);
typed_id!(
    /// Open limit order instance id.
    LimitOrderId,
    ObjectType::LimitOrder
);
typed_id!(
    /// Pending proposal instance id.
    ProposalId,
    ObjectType::Proposal
);
typed_id!(
    /// Withdraw permission instance id.
    WithdrawPermissionId,
    ObjectType::WithdrawPermission
);

impl AssetId {
    /// The core asset every chain is born with.
    pub const CORE: AssetId = AssetId(0);
}

/// 32-byte BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// 20-byte block id.
///
/// The first 4 bytes are the big-endian block number, the remaining 16 come
/// from the header digest. Ids therefore sort by height, and the height can
/// be read back without a store lookup.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BlockId(pub [u8; 20]);

impl BlockId {
    pub const fn zero() -> Self {
        Self([0u8; 20])
    }

    /// Build a block id from a header digest and the block's height.
    pub fn from_digest(digest: &Digest, block_num: u32) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.0[..20]);
        bytes[..4].copy_from_slice(&block_num.to_be_bytes());
        Self(bytes)
    }

    /// Block number embedded in the id.
    pub fn num(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// The 32-bit prefix transactions reference for TaPoS, taken
    /// little-endian from bytes 4..8 (the first bytes past the height).
    pub fn tapos_prefix(&self) -> u32 {
        u32::from_le_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId(#{} {})", self.num(), hex::encode(&self.0[4..10]))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for BlockId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// 20-byte transaction id: a truncated digest of the transaction body with
/// signatures excluded, so adding or stripping signatures never changes it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TransactionId(pub [u8; 20]);

impl TransactionId {
    pub fn from_digest(digest: &Digest) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.0[..20]);
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_embeds_height_big_endian() {
        let digest = Digest::new([0xAB; 32]);
        let id = BlockId::from_digest(&digest, 0x0102_0304);
        assert_eq!(id.num(), 0x0102_0304);
        assert_eq!(&id.0[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&id.0[4..], &[0xAB; 16]);
    }

    #[test]
    fn block_ids_sort_by_height() {
        let digest = Digest::new([0xFF; 32]);
        let lo = BlockId::from_digest(&digest, 7);
        let hi = BlockId::from_digest(&Digest::new([0x00; 32]), 8);
        assert!(lo < hi);
    }

    #[test]
    fn tapos_prefix_reads_bytes_after_height() {
        let mut bytes = [0u8; 32];
        bytes[4..8].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        let id = BlockId::from_digest(&Digest::new(bytes), 1);
        assert_eq!(id.tapos_prefix(), 0x1234_5678);
    }

    #[test]
    fn object_id_display() {
        assert_eq!(AccountId(17).to_string(), "0.17");
        assert_eq!(LimitOrderId(3).to_string(), "3.3");
    }
}
