//! Object store, secondary indices, and the undo session stack.
//!
//! All state mutation funnels through [`ObjectStore::create`],
//! [`ObjectStore::modify`], and [`ObjectStore::remove`]. While an undo
//! session is active each mutation records a reversible delta (the prior
//! value, or a birth/death marker) into the top frame; secondary indices
//! are maintained by the same three entry points, so rolling a frame back
//! restores them for free.
//!
//! Sessions form a LIFO stack. A frame can be
//! * merged: folded into the frame below (or made permanent when it is the
//!   only frame),
//! * committed: left on the stack so `pop_commit` can revert it later
//!   (this is how `pop_block` works), or
//! * undone: its deltas applied in reverse immediately.
//!
//! `max_size` bounds how many committed frames are retained; the oldest
//! fall off and become irreversible.

use crate::error::{ChainError, ChainResult};
use crate::object::objects::*;
use lib_types::{
    AccountId, AssetId, LimitOrderId, ObjectId, ObjectType, Price, ProposalId, TimePointSec,
    TransactionId, WithdrawPermissionId, WitnessId,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

pub const GLOBAL_PROPERTY_ID: ObjectId = ObjectId::new(ObjectType::GlobalProperty, 0);
pub const DYNAMIC_PROPERTY_ID: ObjectId = ObjectId::new(ObjectType::DynamicGlobalProperty, 0);

/// Default number of committed sessions kept revertible.
const DEFAULT_MAX_UNDO_SIZE: usize = 1_440;

/// Order-book index key: per market, best offer first, then creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBookKey {
    pub market: (AssetId, AssetId),
    pub price: Price,
    pub id: LimitOrderId,
}

impl OrderBookKey {
    fn for_order(order: &LimitOrderObject) -> Self {
        Self { market: order.sell_price.market(), price: order.sell_price, id: order.id }
    }
}

impl Ord for OrderBookKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.market
            .cmp(&other.market)
            // higher rate sorts first within a market
            .then_with(|| other.price.cmp_rate(&self.price))
            .then_with(|| {
                (self.price.base.amount, self.price.quote.amount)
                    .cmp(&(other.price.base.amount, other.price.quote.amount))
            })
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for OrderBookKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Secondary indices. Kept in a separate struct so index maintenance can
/// borrow the indices mutably while reading the object arena.
#[derive(Debug, Default)]
struct Indices {
    account_by_name: BTreeMap<String, AccountId>,
    asset_by_symbol: BTreeMap<String, AssetId>,
    witness_by_account: BTreeMap<AccountId, WitnessId>,
    order_book: BTreeSet<OrderBookKey>,
    orders_by_expiration: BTreeSet<(TimePointSec, LimitOrderId)>,
    trx_by_id: BTreeMap<TransactionId, u64>,
    trx_by_expiration: BTreeSet<(TimePointSec, u64)>,
    proposals_by_expiration: BTreeSet<(TimePointSec, ProposalId)>,
    withdrawals_by_expiration: BTreeSet<(TimePointSec, WithdrawPermissionId)>,
}

impl Indices {
    fn add(&mut self, obj: &AnyObject) {
        match obj {
            AnyObject::Account(a) => {
                self.account_by_name.insert(a.name.clone(), a.id);
            }
            AnyObject::Asset(a) => {
                self.asset_by_symbol.insert(a.symbol.clone(), a.id);
            }
            AnyObject::Witness(w) => {
                self.witness_by_account.insert(w.witness_account, w.id);
            }
            AnyObject::LimitOrder(o) => {
                self.order_book.insert(OrderBookKey::for_order(o));
                self.orders_by_expiration.insert((o.expiration, o.id));
            }
            AnyObject::Transaction(t) => {
                self.trx_by_id.insert(t.trx_id, t.instance);
                self.trx_by_expiration.insert((t.expiration, t.instance));
            }
            AnyObject::Proposal(p) => {
                self.proposals_by_expiration.insert((p.expiration_time, p.id));
            }
            AnyObject::WithdrawPermission(w) => {
                self.withdrawals_by_expiration.insert((w.expiration, w.id));
            }
            AnyObject::BlockSummary(_)
            | AnyObject::GlobalProperty(_)
            | AnyObject::DynamicGlobalProperty(_) => {}
        }
    }

    fn remove(&mut self, obj: &AnyObject) {
        match obj {
            AnyObject::Account(a) => {
                self.account_by_name.remove(&a.name);
            }
            AnyObject::Asset(a) => {
                self.asset_by_symbol.remove(&a.symbol);
            }
            AnyObject::Witness(w) => {
                self.witness_by_account.remove(&w.witness_account);
            }
            AnyObject::LimitOrder(o) => {
                self.order_book.remove(&OrderBookKey::for_order(o));
                self.orders_by_expiration.remove(&(o.expiration, o.id));
            }
            AnyObject::Transaction(t) => {
                self.trx_by_id.remove(&t.trx_id);
                self.trx_by_expiration.remove(&(t.expiration, t.instance));
            }
            AnyObject::Proposal(p) => {
                self.proposals_by_expiration.remove(&(p.expiration_time, p.id));
            }
            AnyObject::WithdrawPermission(w) => {
                self.withdrawals_by_expiration.remove(&(w.expiration, w.id));
            }
            AnyObject::BlockSummary(_)
            | AnyObject::GlobalProperty(_)
            | AnyObject::DynamicGlobalProperty(_) => {}
        }
    }
}

/// One session's reversible deltas.
#[derive(Debug, Default)]
struct UndoFrame {
    /// First-touch snapshot of every modified object.
    old_values: BTreeMap<ObjectId, AnyObject>,
    /// Objects born in this frame.
    created: BTreeSet<ObjectId>,
    /// Objects that died in this frame, with their final prior value.
    removed: BTreeMap<ObjectId, AnyObject>,
    /// Per-type next-instance counters as they stood at first allocation.
    old_next_ids: BTreeMap<ObjectType, u64>,
}

impl UndoFrame {
    fn is_empty(&self) -> bool {
        self.old_values.is_empty() && self.created.is_empty() && self.removed.is_empty()
    }
}

/// Token for an open undo session. Must be consumed by exactly one of
/// [`ObjectStore::merge_session`], [`ObjectStore::commit_session`], or
/// [`ObjectStore::undo_session`]; sessions are strictly LIFO and the store
/// checks the depth on consumption.
#[must_use = "an undo session must be merged, committed, or undone"]
#[derive(Debug)]
pub struct UndoSession {
    depth: usize,
}

#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: BTreeMap<ObjectId, AnyObject>,
    next_ids: BTreeMap<ObjectType, u64>,
    indices: Indices,
    frames: Vec<UndoFrame>,
    active_sessions: usize,
    max_undo_size: usize,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self { max_undo_size: DEFAULT_MAX_UNDO_SIZE, ..Default::default() }
    }

    // ------------------------------------------------------------------
    // raw arena ops: no undo recording, indices always maintained
    // ------------------------------------------------------------------

    fn raw_insert(&mut self, obj: AnyObject) {
        let id = obj.object_id();
        self.indices.add(&obj);
        self.objects.insert(id, obj);
    }

    fn raw_remove(&mut self, id: ObjectId) -> Option<AnyObject> {
        let obj = self.objects.remove(&id)?;
        self.indices.remove(&obj);
        Some(obj)
    }

    // ------------------------------------------------------------------
    // recorded mutations
    // ------------------------------------------------------------------

    fn recording(&self) -> bool {
        self.active_sessions > 0
    }

    /// Create a new object of `ty`, its instance id assigned by the store.
    pub fn create(
        &mut self,
        ty: ObjectType,
        make: impl FnOnce(u64) -> AnyObject,
    ) -> ChainResult<ObjectId> {
        let instance = *self.next_ids.entry(ty).or_insert(0);
        if self.recording() {
            let frame = self.frames.last_mut().expect("active session implies a frame");
            frame.old_next_ids.entry(ty).or_insert(instance);
        }
        *self.next_ids.get_mut(&ty).expect("just inserted") = instance + 1;

        let obj = make(instance);
        let id = obj.object_id();
        if id.ty != ty || id.instance != instance {
            return Err(ChainError::internal(format!(
                "constructor produced {id}, expected {}.{instance}",
                ty as u8
            )));
        }
        self.create_at(obj)
    }

    /// Insert an object with a caller-chosen instance (fixed-slot tables
    /// such as block summaries and the property singletons).
    pub fn create_at(&mut self, obj: AnyObject) -> ChainResult<ObjectId> {
        let id = obj.object_id();
        if self.objects.contains_key(&id) {
            return Err(ChainError::internal(format!("object {id} already exists")));
        }
        if self.recording() {
            let frame = self.frames.last_mut().expect("active session implies a frame");
            frame.created.insert(id);
        }
        self.raw_insert(obj);
        Ok(id)
    }

    /// Mutate an existing object in place.
    pub fn modify(
        &mut self,
        id: ObjectId,
        f: impl FnOnce(&mut AnyObject),
    ) -> ChainResult<()> {
        let old = self
            .objects
            .get(&id)
            .cloned()
            .ok_or_else(|| ChainError::internal(format!("modify of missing object {id}")))?;
        self.indices.remove(&old);
        {
            let entry = self.objects.get_mut(&id).expect("presence just checked");
            f(entry);
            if entry.object_id() != id {
                return Err(ChainError::internal(format!(
                    "mutator changed identity of {id}"
                )));
            }
        }
        let indices = &mut self.indices;
        indices.add(self.objects.get(&id).expect("presence just checked"));

        if self.recording() {
            let frame = self.frames.last_mut().expect("active session implies a frame");
            if !frame.created.contains(&id) {
                frame.old_values.entry(id).or_insert(old);
            }
        }
        Ok(())
    }

    /// Remove an object, returning its final value.
    pub fn remove(&mut self, id: ObjectId) -> ChainResult<AnyObject> {
        let obj = self
            .raw_remove(id)
            .ok_or_else(|| ChainError::internal(format!("remove of missing object {id}")))?;
        if self.recording() {
            let frame = self.frames.last_mut().expect("active session implies a frame");
            if frame.created.remove(&id) {
                // born and died in the same frame: net no-op
            } else if let Some(first) = frame.old_values.remove(&id) {
                frame.removed.insert(id, first);
            } else {
                frame.removed.insert(id, obj.clone());
            }
        }
        Ok(obj)
    }

    pub fn get(&self, id: ObjectId) -> Option<&AnyObject> {
        self.objects.get(&id)
    }

    /// All live objects of one type, in instance order.
    pub fn range(&self, ty: ObjectType) -> impl Iterator<Item = &AnyObject> {
        self.objects
            .range(ObjectId::new(ty, 0)..=ObjectId::new(ty, u64::MAX))
            .map(|(_, obj)| obj)
    }

    // ------------------------------------------------------------------
    // undo sessions
    // ------------------------------------------------------------------

    pub fn start_undo_session(&mut self) -> UndoSession {
        self.frames.push(UndoFrame::default());
        self.active_sessions += 1;
        UndoSession { depth: self.frames.len() }
    }

    fn consume(&mut self, session: UndoSession) {
        assert_eq!(
            session.depth,
            self.frames.len(),
            "undo sessions must be consumed in LIFO order"
        );
        assert!(self.active_sessions > 0, "no active session to consume");
    }

    /// Fold the session's deltas into its parent; with no parent the deltas
    /// simply become permanent.
    pub fn merge_session(&mut self, session: UndoSession) {
        self.consume(session);
        self.active_sessions -= 1;
        let child = self.frames.pop().expect("session implies a frame");
        if let Some(parent) = self.frames.last_mut() {
            Self::merge_frames(parent, child);
        }
    }

    /// Leave the session's frame on the stack as a committed state that
    /// `pop_commit` can later revert.
    pub fn commit_session(&mut self, session: UndoSession) {
        self.consume(session);
        self.active_sessions -= 1;
        while self.frames.len() - self.active_sessions > self.max_undo_size {
            self.frames.remove(0);
        }
    }

    /// Roll the session back immediately.
    pub fn undo_session(&mut self, session: UndoSession) {
        self.consume(session);
        self.active_sessions -= 1;
        let frame = self.frames.pop().expect("session implies a frame");
        self.apply_frame_reverse(frame);
    }

    /// Revert the most recent committed session (`pop_block`).
    pub fn pop_commit(&mut self) -> ChainResult<()> {
        if self.active_sessions > 0 {
            return Err(ChainError::internal(
                "pop_commit with active undo sessions",
            ));
        }
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| ChainError::internal("no committed session to pop"))?;
        self.apply_frame_reverse(frame);
        Ok(())
    }

    pub fn undo_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions
    }

    pub fn committed_sessions(&self) -> usize {
        self.frames.len() - self.active_sessions
    }

    pub fn max_undo_size(&self) -> usize {
        self.max_undo_size
    }

    pub fn set_max_undo_size(&mut self, size: usize) {
        self.max_undo_size = size;
    }

    /// Ids touched by the innermost open session: `(changed, removed)`.
    pub fn session_touched(&self) -> (Vec<ObjectId>, Vec<ObjectId>) {
        match self.frames.last() {
            Some(frame) => {
                let changed = frame
                    .old_values
                    .keys()
                    .chain(frame.created.iter())
                    .copied()
                    .collect();
                (changed, frame.removed.keys().copied().collect())
            }
            None => (Vec::new(), Vec::new()),
        }
    }

    fn apply_frame_reverse(&mut self, frame: UndoFrame) {
        for (_, obj) in frame.old_values {
            let id = obj.object_id();
            self.raw_remove(id);
            self.raw_insert(obj);
        }
        for id in frame.created {
            self.raw_remove(id);
        }
        for (_, obj) in frame.removed {
            self.raw_insert(obj);
        }
        for (ty, next) in frame.old_next_ids {
            self.next_ids.insert(ty, next);
        }
    }

    /// Merging must behave as if the child's mutations had happened
    /// directly in the parent frame.
    fn merge_frames(parent: &mut UndoFrame, child: UndoFrame) {
        for (id, old) in child.old_values {
            if parent.created.contains(&id) || parent.old_values.contains_key(&id) {
                continue; // parent already holds the earlier snapshot
            }
            parent.old_values.insert(id, old);
        }
        for id in child.created {
            parent.created.insert(id);
        }
        for (id, old) in child.removed {
            if parent.created.remove(&id) {
                continue; // born in parent, died in child: net no-op
            }
            if let Some(first) = parent.old_values.remove(&id) {
                parent.removed.insert(id, first);
            } else {
                parent.removed.insert(id, old);
            }
        }
        for (ty, next) in child.old_next_ids {
            parent.old_next_ids.entry(ty).or_insert(next);
        }
    }

    // ------------------------------------------------------------------
    // property singletons
    // ------------------------------------------------------------------

    /// The global property object. Created at genesis; its absence is state
    /// corruption, which we refuse to run past.
    pub fn global_properties(&self) -> &GlobalPropertyObject {
        match self.objects.get(&GLOBAL_PROPERTY_ID) {
            Some(AnyObject::GlobalProperty(g)) => g,
            _ => panic!("global property object missing: store was never initialized"),
        }
    }

    pub fn dynamic_properties(&self) -> &DynamicGlobalPropertyObject {
        match self.objects.get(&DYNAMIC_PROPERTY_ID) {
            Some(AnyObject::DynamicGlobalProperty(d)) => d,
            _ => panic!("dynamic property object missing: store was never initialized"),
        }
    }

    pub fn modify_global(
        &mut self,
        f: impl FnOnce(&mut GlobalPropertyObject),
    ) -> ChainResult<()> {
        self.modify(GLOBAL_PROPERTY_ID, |obj| {
            if let AnyObject::GlobalProperty(g) = obj {
                f(g)
            }
        })
    }

    pub fn modify_dynamic(
        &mut self,
        f: impl FnOnce(&mut DynamicGlobalPropertyObject),
    ) -> ChainResult<()> {
        self.modify(DYNAMIC_PROPERTY_ID, |obj| {
            if let AnyObject::DynamicGlobalProperty(d) = obj {
                f(d)
            }
        })
    }

    // ------------------------------------------------------------------
    // index queries
    // ------------------------------------------------------------------

    pub fn find_account_by_name(&self, name: &str) -> Option<AccountId> {
        self.indices.account_by_name.get(name).copied()
    }

    pub fn find_asset_by_symbol(&self, symbol: &str) -> Option<AssetId> {
        self.indices.asset_by_symbol.get(symbol).copied()
    }

    pub fn find_witness_by_account(&self, account: AccountId) -> Option<WitnessId> {
        self.indices.witness_by_account.get(&account).copied()
    }

    pub fn find_transaction_instance(&self, trx_id: &TransactionId) -> Option<u64> {
        self.indices.trx_by_id.get(trx_id).copied()
    }

    /// Open orders selling `base` for `quote`, best offer first.
    pub fn orders_in_market(
        &self,
        base: AssetId,
        quote: AssetId,
    ) -> impl Iterator<Item = LimitOrderId> + '_ {
        let lo = OrderBookKey {
            market: (base, quote),
            price: Price::new(
                lib_types::AssetAmount::new(i64::MAX, base),
                lib_types::AssetAmount::new(1, quote),
            ),
            id: LimitOrderId(0),
        };
        let hi = OrderBookKey {
            market: (base, quote),
            price: Price::new(
                lib_types::AssetAmount::new(1, base),
                lib_types::AssetAmount::new(i64::MAX, quote),
            ),
            id: LimitOrderId(u64::MAX),
        };
        self.indices.order_book.range(lo..=hi).map(|key| key.id)
    }

    pub fn expired_orders(&self, now: TimePointSec) -> Vec<LimitOrderId> {
        self.indices
            .orders_by_expiration
            .range(..(now, LimitOrderId(0)))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn expired_transactions(&self, now: TimePointSec) -> Vec<u64> {
        self.indices
            .trx_by_expiration
            .range(..(now, 0u64))
            .map(|(_, instance)| *instance)
            .collect()
    }

    pub fn expired_proposals(&self, now: TimePointSec) -> Vec<ProposalId> {
        self.indices
            .proposals_by_expiration
            .range(..(now, ProposalId(0)))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn expired_withdraw_permissions(&self, now: TimePointSec) -> Vec<WithdrawPermissionId> {
        self.indices
            .withdrawals_by_expiration
            .range(..(now, WithdrawPermissionId(0)))
            .map(|(_, id)| *id)
            .collect()
    }
}

macro_rules! typed_accessors {
    ($get:ident, $find:ident, $modify:ident, $variant:ident, $obj:ty, $idty:ty) => {
        impl ObjectStore {
            pub fn $find(&self, id: $idty) -> Option<&$obj> {
                match self.objects.get(&id.object_id()) {
                    Some(AnyObject::$variant(o)) => Some(o),
                    _ => None,
                }
            }

            pub fn $get(&self, id: $idty) -> ChainResult<&$obj> {
                self.$find(id).ok_or_else(|| ChainError::missing_object(id.object_id()))
            }

            pub fn $modify(
                &mut self,
                id: $idty,
                f: impl FnOnce(&mut $obj),
            ) -> ChainResult<()> {
                if self.$find(id).is_none() {
                    return Err(ChainError::missing_object(id.object_id()));
                }
                self.modify(id.object_id(), |obj| {
                    if let AnyObject::$variant(o) = obj {
                        f(o)
                    }
                })
            }
        }
    };
}

typed_accessors!(get_account, find_account, modify_account, Account, AccountObject, AccountId);
typed_accessors!(get_asset, find_asset, modify_asset, Asset, AssetObject, AssetId);
typed_accessors!(get_witness, find_witness, modify_witness, Witness, WitnessObject, WitnessId);
typed_accessors!(
    get_limit_order,
    find_limit_order,
    modify_limit_order,
    LimitOrder,
    LimitOrderObject,
    LimitOrderId
);
typed_accessors!(get_proposal, find_proposal, modify_proposal, Proposal, ProposalObject, ProposalId);
typed_accessors!(
    get_withdraw_permission,
    find_withdraw_permission,
    modify_withdraw_permission,
    WithdrawPermission,
    WithdrawPermissionObject,
    WithdrawPermissionId
);

impl ObjectStore {
    pub fn find_block_summary(&self, instance: u64) -> Option<&BlockSummaryObject> {
        match self.objects.get(&ObjectId::new(ObjectType::BlockSummary, instance)) {
            Some(AnyObject::BlockSummary(s)) => Some(s),
            _ => None,
        }
    }

    pub fn find_transaction_object(&self, instance: u64) -> Option<&TransactionObject> {
        match self.objects.get(&ObjectId::new(ObjectType::Transaction, instance)) {
            Some(AnyObject::Transaction(t)) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Authority;
    use lib_crypto::PublicKey;

    fn account(instance: u64, name: &str, core: i64) -> AnyObject {
        let mut balances = BTreeMap::new();
        if core != 0 {
            balances.insert(AssetId::CORE, core);
        }
        AnyObject::Account(AccountObject {
            id: AccountId(instance),
            name: name.into(),
            owner: Authority::single_key(PublicKey([instance as u8; 32])),
            active: Authority::single_key(PublicKey([instance as u8; 32])),
            votes: BTreeSet::new(),
            balances,
        })
    }

    fn create_account(store: &mut ObjectStore, name: &str, core: i64) -> AccountId {
        let name = name.to_string();
        let id = store
            .create(ObjectType::Account, |i| account(i, &name, core))
            .unwrap();
        AccountId(id.instance)
    }

    #[test]
    fn create_modify_remove_maintain_indices() {
        let mut store = ObjectStore::new();
        let id = create_account(&mut store, "alice", 100);
        assert_eq!(store.find_account_by_name("alice"), Some(id));

        store
            .modify_account(id, |a| a.name = "alicia".into())
            .unwrap();
        assert_eq!(store.find_account_by_name("alice"), None);
        assert_eq!(store.find_account_by_name("alicia"), Some(id));

        store.remove(id.object_id()).unwrap();
        assert_eq!(store.find_account_by_name("alicia"), None);
    }

    #[test]
    fn undo_restores_prior_state_and_indices() {
        let mut store = ObjectStore::new();
        let alice = create_account(&mut store, "alice", 100);

        let session = store.start_undo_session();
        store.modify_account(alice, |a| a.adjust_balance(lib_types::AssetAmount::core(-40))).unwrap();
        let bob = create_account(&mut store, "bob", 0);
        store.remove(alice.object_id()).ok(); // modify then remove in same frame
        store.undo_session(session);

        assert_eq!(store.get_account(alice).unwrap().balance(AssetId::CORE), 100);
        assert_eq!(store.find_account(bob), None);
        assert_eq!(store.find_account_by_name("bob"), None);
        // instance counter rolled back: the next create reuses bob's slot
        let carol = create_account(&mut store, "carol", 0);
        assert_eq!(carol, bob);
    }

    #[test]
    fn merge_behaves_like_direct_mutation_in_parent() {
        let mut store = ObjectStore::new();
        let alice = create_account(&mut store, "alice", 100);

        let outer = store.start_undo_session();
        store.modify_account(alice, |a| a.adjust_balance(lib_types::AssetAmount::core(-10))).unwrap();

        let inner = store.start_undo_session();
        store.modify_account(alice, |a| a.adjust_balance(lib_types::AssetAmount::core(-5))).unwrap();
        store.merge_session(inner);

        // rolling back the outer frame must revert both mutations
        store.undo_session(outer);
        assert_eq!(store.get_account(alice).unwrap().balance(AssetId::CORE), 100);
    }

    #[test]
    fn commit_then_pop_commit_reverts() {
        let mut store = ObjectStore::new();
        let alice = create_account(&mut store, "alice", 100);

        let session = store.start_undo_session();
        store.modify_account(alice, |a| a.adjust_balance(lib_types::AssetAmount::core(50))).unwrap();
        store.commit_session(session);
        assert_eq!(store.get_account(alice).unwrap().balance(AssetId::CORE), 150);
        assert_eq!(store.committed_sessions(), 1);

        store.pop_commit().unwrap();
        assert_eq!(store.get_account(alice).unwrap().balance(AssetId::CORE), 100);
        assert_eq!(store.committed_sessions(), 0);
    }

    #[test]
    fn max_size_bounds_pop_depth() {
        let mut store = ObjectStore::new();
        store.set_max_undo_size(2);
        let alice = create_account(&mut store, "alice", 0);

        for n in 1..=4i64 {
            let s = store.start_undo_session();
            store
                .modify_account(alice, |a| a.adjust_balance(lib_types::AssetAmount::core(n)))
                .unwrap();
            store.commit_session(s);
        }
        assert_eq!(store.committed_sessions(), 2);
        store.pop_commit().unwrap();
        store.pop_commit().unwrap();
        assert!(store.pop_commit().is_err());
        // 1 + 2 stayed permanent
        assert_eq!(store.get_account(alice).unwrap().balance(AssetId::CORE), 3);
    }

    #[test]
    fn nested_child_discarded_with_parent() {
        let mut store = ObjectStore::new();
        let outer = store.start_undo_session();
        let bob = create_account(&mut store, "bob", 0);
        let inner = store.start_undo_session();
        let carol = create_account(&mut store, "carol", 0);
        store.merge_session(inner);
        store.undo_session(outer);
        assert!(store.find_account(bob).is_none());
        assert!(store.find_account(carol).is_none());
    }

    #[test]
    fn order_book_orders_best_first() {
        let mut store = ObjectStore::new();
        let seller = create_account(&mut store, "seller", 0);
        let mut make_order = |base: i64, quote: i64| {
            store
                .create(ObjectType::LimitOrder, |i| {
                    AnyObject::LimitOrder(LimitOrderObject {
                        id: LimitOrderId(i),
                        seller,
                        for_sale: base,
                        sell_price: Price::new(
                            lib_types::AssetAmount::new(base, AssetId(1)),
                            lib_types::AssetAmount::new(quote, AssetId(2)),
                        ),
                        expiration: TimePointSec::new(1_000),
                    })
                })
                .unwrap()
        };
        let cheap = make_order(10, 20); // rate 0.5
        let rich = make_order(10, 5); // rate 2.0
        let mid = make_order(10, 10); // rate 1.0

        let ids: Vec<_> = store.orders_in_market(AssetId(1), AssetId(2)).collect();
        assert_eq!(
            ids,
            vec![
                LimitOrderId(rich.instance),
                LimitOrderId(mid.instance),
                LimitOrderId(cheap.instance)
            ]
        );
    }

    #[test]
    fn expiration_scans_are_strictly_before_now() {
        let mut store = ObjectStore::new();
        let alice = create_account(&mut store, "alice", 0);
        for (n, exp) in [(0u64, 10u32), (1, 20), (2, 30)] {
            store
                .create_at(AnyObject::Transaction(TransactionObject {
                    instance: n,
                    trx_id: TransactionId([n as u8; 20]),
                    expiration: TimePointSec::new(exp),
                    trx: Default::default(),
                }))
                .unwrap();
        }
        let _ = alice;
        assert_eq!(store.expired_transactions(TimePointSec::new(20)), vec![0]);
        assert_eq!(store.expired_transactions(TimePointSec::new(31)), vec![0, 1, 2]);
    }
}
