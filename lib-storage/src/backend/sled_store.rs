//! Sled-backed persistent backend.
//!
//! Two trees: `blocks` maps id bytes to the block blob, `heights` maps the
//! big-endian block number to the id. Because ids already embed the height,
//! the `heights` tree is strictly an index.

use crate::{BlockStore, StoreError};
use lib_types::BlockId;
use std::path::Path;
use tracing::debug;

pub struct SledBlockStore {
    blocks: sled::Tree,
    heights: sled::Tree,
    _db: sled::Db,
}

impl SledBlockStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let blocks = db.open_tree("blocks")?;
        let heights = db.open_tree("heights")?;
        debug!(blocks = blocks.len(), "opened sled block store");
        Ok(Self { blocks, heights, _db: db })
    }

    fn decode_id(bytes: &[u8]) -> Result<BlockId, StoreError> {
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| StoreError::Backend("corrupt block id in heights tree".into()))?;
        Ok(BlockId(arr))
    }
}

impl BlockStore for SledBlockStore {
    fn store(&self, id: BlockId, block: &[u8]) -> Result<(), StoreError> {
        if let Some(existing) = self.blocks.get(id.as_bytes())? {
            if existing.as_ref() != block {
                return Err(StoreError::Conflict { id });
            }
            return Ok(());
        }
        self.blocks.insert(id.as_bytes(), block)?;
        self.heights.insert(id.num().to_be_bytes(), &id.0[..])?;
        Ok(())
    }

    fn fetch_optional(&self, id: &BlockId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blocks.get(id.as_bytes())?.map(|v| v.to_vec()))
    }

    fn fetch_by_number(&self, num: u32) -> Result<Option<Vec<u8>>, StoreError> {
        match self.heights.get(num.to_be_bytes())? {
            Some(id_bytes) => {
                let id = Self::decode_id(&id_bytes)?;
                self.fetch_optional(&id)
            }
            None => Ok(None),
        }
    }

    fn fetch_block_id(&self, num: u32) -> Result<BlockId, StoreError> {
        match self.heights.get(num.to_be_bytes())? {
            Some(id_bytes) => Self::decode_id(&id_bytes),
            None => Err(StoreError::UnknownHeight(num)),
        }
    }
}
