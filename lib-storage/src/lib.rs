//! Meridian block blob store.
//!
//! Fully validated blocks are persisted here as opaque canonical bytes,
//! keyed by block id and block number. The store is append-only: callers
//! never delete, and must never ask for deletion below the last irreversible
//! height. Interpretation of the bytes belongs to the chain crate.

pub mod backend;
mod error;

pub use backend::memory::MemoryBlockStore;
pub use backend::sled_store::SledBlockStore;
pub use error::StoreError;

use lib_types::BlockId;

/// Append-only block persistence contract.
///
/// `store` is idempotent for an id already present (re-storing the identical
/// block during a fork replay is legal); the block number is carried by the
/// id itself.
pub trait BlockStore: Send + Sync {
    /// Persist a block's canonical bytes under its id.
    fn store(&self, id: BlockId, block: &[u8]) -> Result<(), StoreError>;

    /// Fetch a block by id, if present.
    fn fetch_optional(&self, id: &BlockId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Fetch the block stored at a height, if any.
    fn fetch_by_number(&self, num: u32) -> Result<Option<Vec<u8>>, StoreError>;

    /// Id of the block stored at a height; errors if the height is unknown.
    fn fetch_block_id(&self, num: u32) -> Result<BlockId, StoreError>;
}
