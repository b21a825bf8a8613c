//! In-memory backend.
//!
//! The default for tests and for nodes that replay from a peer on startup.

use crate::{BlockStore, StoreError};
use lib_types::BlockId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Inner {
    by_id: HashMap<BlockId, Vec<u8>>,
    id_by_num: BTreeMap<u32, BlockId>,
}

/// Heap-backed block store guarded by a reader-writer lock.
#[derive(Default)]
pub struct MemoryBlockStore {
    inner: RwLock<Inner>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks held.
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockStore for MemoryBlockStore {
    fn store(&self, id: BlockId, block: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_id.get(&id) {
            if existing != block {
                return Err(StoreError::Conflict { id });
            }
            return Ok(());
        }
        inner.by_id.insert(id, block.to_vec());
        inner.id_by_num.insert(id.num(), id);
        Ok(())
    }

    fn fetch_optional(&self, id: &BlockId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().by_id.get(id).cloned())
    }

    fn fetch_by_number(&self, num: u32) -> Result<Option<Vec<u8>>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.id_by_num.get(&num).and_then(|id| inner.by_id.get(id)).cloned())
    }

    fn fetch_block_id(&self, num: u32) -> Result<BlockId, StoreError> {
        self.inner
            .read()
            .id_by_num
            .get(&num)
            .copied()
            .ok_or(StoreError::UnknownHeight(num))
    }
}
