//! In-memory tree of recently received blocks.
//!
//! Holds every block that is not yet known to be irreversible, rooted just
//! above the last irreversible height. The head is the deepest leaf,
//! ties broken by arrival order, so two peers that saw the same blocks in
//! the same order agree on the head. Network threads read this structure
//! for lookups; all writes come through the serialising chain lock.

use crate::error::{ChainError, ChainResult};
use crate::protocol::SignedBlock;
use lib_types::BlockId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct ForkItem {
    pub block: SignedBlock,
    pub id: BlockId,
    pub previous_id: BlockId,
    pub num: u32,
    /// Arrival order; the head tie-breaker.
    seq: u64,
}

pub type ItemPtr = Arc<ForkItem>;

/// Both paths of a fork, each ordered head-first, ending at the two
/// children of the common ancestor: `first.last().previous_id ==
/// second.last().previous_id`.
pub type BranchPair = (Vec<ItemPtr>, Vec<ItemPtr>);

#[derive(Debug, Default)]
pub struct ForkDatabase {
    index: HashMap<BlockId, ItemPtr>,
    by_num: BTreeMap<u32, Vec<BlockId>>,
    head: Option<ItemPtr>,
    next_seq: u64,
}

impl ForkDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<ItemPtr> {
        self.head.clone()
    }

    pub fn is_known_block(&self, id: &BlockId) -> bool {
        self.index.contains_key(id)
    }

    pub fn fetch_block(&self, id: &BlockId) -> Option<ItemPtr> {
        self.index.get(id).cloned()
    }

    /// Every stored block at the given height; forks can hold several.
    pub fn fetch_block_by_number(&self, num: u32) -> Vec<ItemPtr> {
        self.by_num
            .get(&num)
            .map(|ids| ids.iter().filter_map(|id| self.index.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Insert a block and return the (possibly new) head item.
    ///
    /// Rejects duplicates, and rejects blocks whose parent is neither known
    /// here nor the tree root; the caller is expected to fetch ancestors
    /// and retry. The first block inserted into an empty tree is accepted
    /// unconditionally and becomes the root.
    pub fn push_block(&mut self, block: SignedBlock) -> ChainResult<ItemPtr> {
        let id = block.id();
        if self.index.contains_key(&id) {
            return Err(ChainError::structural(format!("duplicate block {id}")));
        }
        if !self.index.is_empty() && !self.index.contains_key(&block.previous) {
            return Err(ChainError::Unlinked { id });
        }

        let item = Arc::new(ForkItem {
            previous_id: block.previous,
            id,
            num: block.block_num(),
            seq: self.next_seq,
            block,
        });
        self.next_seq += 1;
        self.index.insert(id, item.clone());
        self.by_num.entry(item.num).or_default().push(id);

        let better = match &self.head {
            // strictly greater height wins; at equal height the earlier
            // arrival keeps the head
            Some(head) => item.num > head.num,
            None => true,
        };
        if better {
            self.head = Some(item.clone());
        }
        Ok(self.head.clone().expect("head set above"))
    }

    /// Walk both ids back to their common ancestor.
    pub fn fetch_branch_from(&self, first: BlockId, second: BlockId) -> ChainResult<BranchPair> {
        let mut walk_first = self.require(&first)?;
        let mut walk_second = self.require(&second)?;
        let mut branch_first = Vec::new();
        let mut branch_second = Vec::new();

        while walk_first.num > walk_second.num {
            branch_first.push(walk_first.clone());
            walk_first = self.require(&walk_first.previous_id)?;
        }
        while walk_second.num > walk_first.num {
            branch_second.push(walk_second.clone());
            walk_second = self.require(&walk_second.previous_id)?;
        }
        while walk_first.id != walk_second.id {
            branch_first.push(walk_first.clone());
            branch_second.push(walk_second.clone());
            walk_first = self.require(&walk_first.previous_id)?;
            walk_second = self.require(&walk_second.previous_id)?;
        }
        if let (Some(a), Some(b)) = (branch_first.last(), branch_second.last()) {
            debug_assert_eq!(a.previous_id, b.previous_id);
        }
        Ok((branch_first, branch_second))
    }

    /// Drop a block and every descendant. Used when a fork block fails to
    /// apply; the whole subtree above it is equally invalid.
    pub fn remove(&mut self, id: BlockId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let children: Vec<BlockId> = self
                .index
                .values()
                .filter(|item| item.previous_id == current)
                .map(|item| item.id)
                .collect();
            stack.extend(children);
            if let Some(item) = self.index.remove(&current) {
                if let Some(ids) = self.by_num.get_mut(&item.num) {
                    ids.retain(|other| *other != current);
                    if ids.is_empty() {
                        self.by_num.remove(&item.num);
                    }
                }
            }
        }
        if let Some(head) = &self.head {
            if !self.index.contains_key(&head.id) {
                // fall back to the deepest surviving item, earliest arrival
                self.head = self
                    .index
                    .values()
                    .max_by_key(|item| (item.num, std::cmp::Reverse(item.seq)))
                    .cloned();
                debug!(new_head = ?self.head.as_ref().map(|h| h.id), "fork head removed");
            }
        }
    }

    pub fn set_head(&mut self, item: ItemPtr) {
        self.head = Some(item);
    }

    /// Move the head to its parent (used by `pop_block`).
    pub fn pop_block(&mut self) -> ChainResult<()> {
        let head = self.head.take().ok_or_else(|| {
            ChainError::internal("pop_block on an empty fork database")
        })?;
        self.head = self.index.get(&head.previous_id).cloned();
        Ok(())
    }

    /// Forget everything below the last irreversible height. No fork switch
    /// may cross that boundary, so those items can never be needed again.
    pub fn prune_below(&mut self, num: u32) {
        let stale: Vec<BlockId> = self
            .index
            .values()
            .filter(|item| item.num < num)
            .map(|item| item.id)
            .collect();
        for id in stale {
            if let Some(item) = self.index.remove(&id) {
                if let Some(ids) = self.by_num.get_mut(&item.num) {
                    ids.retain(|other| *other != id);
                    if ids.is_empty() {
                        self.by_num.remove(&item.num);
                    }
                }
            }
        }
    }

    fn require(&self, id: &BlockId) -> ChainResult<ItemPtr> {
        self.fetch_block(id).ok_or_else(|| {
            ChainError::internal(format!("fork item {id} missing while walking a branch"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_crypto::PrivateKey;
    use lib_types::{TimePointSec, WitnessId};

    fn make_block(previous: BlockId, timestamp: u32, seed: u8) -> SignedBlock {
        let mut block = SignedBlock {
            previous,
            timestamp: TimePointSec::new(timestamp),
            witness: WitnessId(0),
            ..Default::default()
        };
        block.sign(&PrivateKey::from_seed([seed; 32]));
        block
    }

    #[test]
    fn linear_growth_tracks_head() {
        let mut db = ForkDatabase::new();
        let b1 = make_block(BlockId::zero(), 5, 1);
        let id1 = b1.id();
        let head = db.push_block(b1).unwrap();
        assert_eq!(head.id, id1);

        let b2 = make_block(id1, 10, 2);
        let id2 = b2.id();
        let head = db.push_block(b2).unwrap();
        assert_eq!(head.id, id2);
        assert_eq!(head.num, 2);
    }

    #[test]
    fn equal_height_keeps_first_arrival() {
        let mut db = ForkDatabase::new();
        let b1 = make_block(BlockId::zero(), 5, 1);
        let id1 = b1.id();
        db.push_block(b1).unwrap();

        let first = make_block(id1, 10, 2);
        let first_id = first.id();
        db.push_block(first).unwrap();
        let rival = make_block(id1, 10, 3);
        let head = db.push_block(rival).unwrap();
        assert_eq!(head.id, first_id);
    }

    #[test]
    fn duplicates_and_unlinked_blocks_rejected() {
        let mut db = ForkDatabase::new();
        let b1 = make_block(BlockId::zero(), 5, 1);
        let id1 = b1.id();
        db.push_block(b1.clone()).unwrap();
        assert!(db.push_block(b1).is_err());

        let orphan = make_block(BlockId::from_digest(&lib_types::Digest::new([9; 32]), 7), 40, 4);
        assert!(matches!(db.push_block(orphan), Err(ChainError::Unlinked { .. })));
        assert!(db.is_known_block(&id1));
    }

    #[test]
    fn branch_fetch_meets_at_common_ancestor() {
        let mut db = ForkDatabase::new();
        let root = make_block(BlockId::zero(), 5, 1);
        let root_id = root.id();
        db.push_block(root).unwrap();

        // root -> a1 -> a2 and root -> b1 -> b2 -> b3
        let a1 = make_block(root_id, 10, 2);
        let a1_id = a1.id();
        db.push_block(a1).unwrap();
        let a2 = make_block(a1_id, 15, 3);
        let a2_id = a2.id();
        db.push_block(a2).unwrap();

        let b1 = make_block(root_id, 10, 4);
        let b1_id = b1.id();
        db.push_block(b1).unwrap();
        let b2 = make_block(b1_id, 15, 5);
        let b2_id = b2.id();
        db.push_block(b2).unwrap();
        let b3 = make_block(b2_id, 20, 6);
        let b3_id = b3.id();
        db.push_block(b3).unwrap();

        let (long, short) = db.fetch_branch_from(b3_id, a2_id).unwrap();
        assert_eq!(long.iter().map(|i| i.id).collect::<Vec<_>>(), vec![b3_id, b2_id, b1_id]);
        assert_eq!(short.iter().map(|i| i.id).collect::<Vec<_>>(), vec![a2_id, a1_id]);
        assert_eq!(long.last().unwrap().previous_id, short.last().unwrap().previous_id);
    }

    #[test]
    fn remove_drops_whole_subtree_and_refinds_head() {
        let mut db = ForkDatabase::new();
        let root = make_block(BlockId::zero(), 5, 1);
        let root_id = root.id();
        db.push_block(root).unwrap();
        let mid = make_block(root_id, 10, 2);
        let mid_id = mid.id();
        db.push_block(mid).unwrap();
        let tip = make_block(mid_id, 15, 3);
        let tip_id = tip.id();
        db.push_block(tip).unwrap();

        db.remove(mid_id);
        assert!(!db.is_known_block(&mid_id));
        assert!(!db.is_known_block(&tip_id));
        assert_eq!(db.head().unwrap().id, root_id);
    }

    #[test]
    fn prune_below_forgets_old_items() {
        let mut db = ForkDatabase::new();
        let b1 = make_block(BlockId::zero(), 5, 1);
        let id1 = b1.id();
        db.push_block(b1).unwrap();
        let b2 = make_block(id1, 10, 2);
        let id2 = b2.id();
        db.push_block(b2).unwrap();

        db.prune_below(2);
        assert!(!db.is_known_block(&id1));
        assert!(db.is_known_block(&id2));
        assert_eq!(db.fetch_block_by_number(1).len(), 0);
    }
}
