//! The chain database.
//!
//! Owns the versioned object store, the fork database, the pending
//! transaction pool, and the applied-operations log, and orchestrates every
//! state transition. Only one caller at a time may hold a mutable reference;
//! the serialising lock lives with the embedding node, not here.
//!
//! Pending-pool invariant: either the pool is empty, or
//! `pending_tx_session` is a live undo session whose contents are exactly
//! the application of the pool on top of the head state. Every public
//! mutation either preserves it or rebuilds it before returning.

mod block;
mod getters;
mod maintenance;
mod update;

pub use getters::{BookOrder, OrderBook};

use crate::authority::{authority_satisfied, AuthorityLevel};
use crate::error::{ChainError, ChainResult};
use crate::evaluator::EvaluatorRegistry;
use crate::fork::ForkDatabase;
use crate::object::{
    AnyObject, AssetObject, BlockSummaryObject, DynamicGlobalPropertyObject, GlobalPropertyObject,
    ObjectStore, UndoSession, WitnessObject,
};
use crate::observer::{AppliedOperation, ChainObserver};
use crate::protocol::{Operation, OperationResult, ProcessedTransaction, SignedTransaction};
use crate::skip::SKIP_NOTHING;
use lib_crypto::PublicKey;
use lib_storage::BlockStore;
use lib_types::{
    AccountId, AssetAmount, AssetId, BlockId, GenesisState, ObjectId, ObjectType, Price,
    TimePointSec, TransactionId, WitnessId,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Before this time a failed proposal's applied-op entries are cleared one
/// by one; from it onward the log is resized instead. Replaying old blocks
/// must reproduce the historical log shape bit for bit.
pub const PROPOSAL_FAIL_CLEANUP_HARDFORK: TimePointSec = TimePointSec(1_446_652_800);

/// A state patch applied at the end of every block while registered.
/// Testing facility; never part of consensus between nodes that do not
/// share the same patches.
pub type DebugUpdate = Box<dyn Fn(&mut ObjectStore) -> ChainResult<()> + Send + Sync>;

pub struct Database {
    pub(crate) objects: ObjectStore,
    pub(crate) fork_db: ForkDatabase,
    pub(crate) block_store: Arc<dyn BlockStore>,
    pub(crate) evaluators: Arc<EvaluatorRegistry>,
    observers: Vec<Arc<dyn ChainObserver>>,

    pub(crate) pending_tx: Vec<ProcessedTransaction>,
    pub(crate) pending_tx_session: Option<UndoSession>,
    pub(crate) popped_tx: VecDeque<ProcessedTransaction>,

    pub(crate) applied_ops: Vec<Option<AppliedOperation>>,
    pub(crate) checkpoints: BTreeMap<u32, BlockId>,
    pub(crate) skip_flags: u32,

    pub(crate) current_block_num: u32,
    pub(crate) current_trx_in_block: u16,
    pub(crate) current_op_in_trx: u16,
    pub(crate) current_virtual_op: u32,
    pub(crate) proposal_nesting_depth: u32,

    debug_updates: Vec<DebugUpdate>,
}

impl Database {
    /// Build block-0 state from a genesis description.
    pub fn open(genesis: &GenesisState, block_store: Arc<dyn BlockStore>) -> ChainResult<Self> {
        let mut db = Self {
            objects: ObjectStore::new(),
            fork_db: ForkDatabase::new(),
            block_store,
            evaluators: Arc::new(EvaluatorRegistry::standard()),
            observers: Vec::new(),
            pending_tx: Vec::new(),
            pending_tx_session: None,
            popped_tx: VecDeque::new(),
            applied_ops: Vec::new(),
            checkpoints: BTreeMap::new(),
            skip_flags: SKIP_NOTHING,
            current_block_num: 0,
            current_trx_in_block: 0,
            current_op_in_trx: 0,
            current_virtual_op: 0,
            proposal_nesting_depth: 0,
            debug_updates: Vec::new(),
        };
        db.init_genesis(genesis)?;
        Ok(db)
    }

    fn init_genesis(&mut self, genesis: &GenesisState) -> ChainResult<()> {
        if genesis.initial_accounts.is_empty() {
            return Err(ChainError::structural("genesis has no accounts"));
        }
        if genesis.initial_witnesses.is_empty() {
            return Err(ChainError::structural("genesis has no witnesses"));
        }

        // genesis state is permanent: no undo session is active here

        let core_rate = Price::new(AssetAmount::core(1), AssetAmount::core(1));
        self.objects.create(ObjectType::Asset, |instance| {
            AnyObject::Asset(AssetObject {
                id: AssetId(instance),
                symbol: "CORE".into(),
                precision: 5,
                issuer: AccountId(0),
                current_supply: genesis
                    .initial_accounts
                    .iter()
                    .map(|a| a.core_balance)
                    .sum(),
                core_exchange_rate: core_rate,
                feeds: BTreeMap::new(),
            })
        })?;

        let mut account_ids = Vec::with_capacity(genesis.initial_accounts.len());
        for account in &genesis.initial_accounts {
            let key = PublicKey(account.key);
            let (name, balance) = (account.name.clone(), account.core_balance);
            let id = self.objects.create(ObjectType::Account, |instance| {
                let mut balances = BTreeMap::new();
                if balance > 0 {
                    balances.insert(AssetId::CORE, balance);
                }
                AnyObject::Account(crate::object::AccountObject {
                    id: AccountId(instance),
                    name,
                    owner: crate::authority::Authority::single_key(key),
                    active: crate::authority::Authority::single_key(key),
                    votes: BTreeSet::new(),
                    balances,
                })
            })?;
            account_ids.push(AccountId(id.instance));
        }

        for asset in &genesis.initial_assets {
            let issuer = *account_ids.get(asset.issuer).ok_or_else(|| {
                ChainError::structural("genesis asset references unknown account")
            })?;
            let (symbol, precision) = (asset.symbol.clone(), asset.precision);
            self.objects.create(ObjectType::Asset, |instance| {
                AnyObject::Asset(AssetObject {
                    id: AssetId(instance),
                    symbol,
                    precision,
                    issuer,
                    current_supply: 0,
                    core_exchange_rate: Price::new(
                        AssetAmount::new(1, AssetId(instance)),
                        AssetAmount::core(1),
                    ),
                    feeds: BTreeMap::new(),
                })
            })?;
        }

        let mut witness_ids = Vec::with_capacity(genesis.initial_witnesses.len());
        for witness in &genesis.initial_witnesses {
            let account = *account_ids.get(witness.account).ok_or_else(|| {
                ChainError::structural("genesis witness references unknown account")
            })?;
            let signing_key = PublicKey(witness.signing_key);
            let id = self.objects.create(ObjectType::Witness, |instance| {
                AnyObject::Witness(WitnessObject {
                    id: WitnessId(instance),
                    witness_account: account,
                    signing_key,
                    url: String::new(),
                    vote_count: 0,
                    last_confirmed_block_num: 0,
                    total_missed: 0,
                })
            })?;
            witness_ids.push(WitnessId(id.instance));
        }

        self.objects.create_at(AnyObject::GlobalProperty(GlobalPropertyObject {
            parameters: genesis.initial_parameters.clone(),
            active_witnesses: witness_ids.clone(),
            current_shuffled_witnesses: witness_ids.clone(),
        }))?;
        self.objects.create_at(AnyObject::DynamicGlobalProperty(
            DynamicGlobalPropertyObject {
                head_block_number: 0,
                head_block_id: BlockId::zero(),
                time: genesis.initial_timestamp,
                current_witness: witness_ids[0],
                next_maintenance_time: genesis.initial_timestamp
                    + genesis.initial_parameters.maintenance_interval,
                last_irreversible_block_num: 0,
                current_aslot: 0,
                recent_slots_filled: u128::MAX,
                maintenance_flag: false,
            },
        ))?;
        // TaPoS slot 0: transactions may reference "block 0" before any
        // real block exists
        self.objects.create_at(AnyObject::BlockSummary(BlockSummaryObject {
            instance: 0,
            block_id: BlockId::zero(),
        }))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // observers & debug updates
    // ------------------------------------------------------------------

    pub fn add_observer(&mut self, observer: Arc<dyn ChainObserver>) {
        self.observers.push(observer);
    }

    pub fn push_debug_update(&mut self, update: DebugUpdate) {
        self.debug_updates.push(update);
    }

    pub fn clear_debug_updates(&mut self) {
        self.debug_updates.clear();
    }

    pub(crate) fn has_debug_updates(&self) -> bool {
        !self.debug_updates.is_empty()
    }

    pub(crate) fn apply_debug_updates(&mut self) -> ChainResult<()> {
        let updates = std::mem::take(&mut self.debug_updates);
        let mut result = Ok(());
        for update in &updates {
            result = update(&mut self.objects);
            if result.is_err() {
                break;
            }
        }
        self.debug_updates = updates;
        result
    }

    fn notify(&mut self, f: impl Fn(&dyn ChainObserver, &Database)) {
        let observers = std::mem::take(&mut self.observers);
        for observer in &observers {
            f(observer.as_ref(), self);
        }
        self.observers = observers;
    }

    pub(crate) fn notify_applied_block(&mut self, block: &crate::protocol::SignedBlock) {
        self.notify(|observer, db| observer.applied_block(db, block, &db.applied_ops));
    }

    pub(crate) fn notify_changed_objects(
        &mut self,
        changed: &[ObjectId],
        removed: &[ObjectId],
    ) {
        self.notify(|observer, db| observer.changed_objects(db, changed, removed));
    }

    pub(crate) fn notify_pending_transaction(&mut self, trx: &SignedTransaction) {
        self.notify(|observer, db| observer.pending_transaction(db, trx));
    }

    // ------------------------------------------------------------------
    // scoped skip flags & pending-pool scope
    // ------------------------------------------------------------------

    /// Set the skip mask for the duration of `f`, restoring the previous
    /// mask on every exit path.
    pub(crate) fn with_skip_flags<R>(
        &mut self,
        skip: u32,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous = self.skip_flags;
        self.skip_flags = skip;
        let result = f(self);
        self.skip_flags = previous;
        result
    }

    /// Empty the pending pool around `f`, then rebuild it by re-applying
    /// popped and previously pending transactions under a fresh session.
    /// Transactions that no longer apply are dropped with a log line; they
    /// were provisional by definition.
    pub(crate) fn without_pending_transactions<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ChainResult<R>,
    ) -> ChainResult<R> {
        let pending = std::mem::take(&mut self.pending_tx);
        if let Some(session) = self.pending_tx_session.take() {
            self.objects.undo_session(session);
        }

        let result = f(self);

        let popped: Vec<ProcessedTransaction> = self.popped_tx.drain(..).collect();
        for tx in popped.into_iter().chain(pending) {
            let id = tx.id();
            if let Err(e) = self.push_transaction(tx.trx, SKIP_NOTHING) {
                debug!(trx = %id, error = %e, "dropping pending transaction");
            }
        }
        // an empty pool needs no speculative state
        if self.pending_tx.is_empty() {
            if let Some(session) = self.pending_tx_session.take() {
                self.objects.undo_session(session);
            }
        }
        result
    }

    /// Drop the pending pool and its session.
    pub fn clear_pending(&mut self) -> ChainResult<()> {
        if !self.pending_tx.is_empty() && self.pending_tx_session.is_none() {
            return Err(ChainError::internal(
                "pending pool populated without a pending session",
            ));
        }
        self.pending_tx.clear();
        if let Some(session) = self.pending_tx_session.take() {
            self.objects.undo_session(session);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // applied-operations log
    // ------------------------------------------------------------------

    pub fn applied_operations(&self) -> &[Option<AppliedOperation>] {
        &self.applied_ops
    }

    pub(crate) fn push_applied_operation(&mut self, op: Operation) -> usize {
        self.applied_ops.push(Some(AppliedOperation {
            op,
            result: OperationResult::Void,
            block_num: self.current_block_num,
            trx_in_block: self.current_trx_in_block,
            op_in_trx: self.current_op_in_trx,
            virtual_op: self.current_virtual_op,
        }));
        self.current_virtual_op += 1;
        self.applied_ops.len() - 1
    }

    pub(crate) fn set_applied_operation_result(&mut self, index: usize, result: OperationResult) {
        match self.applied_ops.get_mut(index) {
            Some(Some(entry)) => entry.result = result,
            _ => tracing::error!(
                index,
                head = self.head_block_num(),
                "could not set operation result"
            ),
        }
    }

    /// Record a virtual operation (order fill and the like) at the current
    /// block/transaction position.
    pub(crate) fn record_virtual_operation(&mut self, op: Operation) {
        let _ = self.push_applied_operation(op);
    }

    // ------------------------------------------------------------------
    // authority
    // ------------------------------------------------------------------

    pub(crate) fn verify_authority(&self, trx: &SignedTransaction) -> ChainResult<()> {
        let keys = trx.signature_keys()?;
        let max_depth = self.objects.global_properties().parameters.max_authority_depth;

        // owner-level requirements supersede active-level ones
        let mut required: BTreeMap<AccountId, AuthorityLevel> = BTreeMap::new();
        for op in &trx.operations {
            for (account, level) in op.required_authorities() {
                let entry = required.entry(account).or_insert(level);
                if level > *entry {
                    *entry = level;
                }
            }
        }

        for (account, level) in required {
            let account_obj = self.objects.get_account(account)?;
            let authority = match level {
                AuthorityLevel::Owner => &account_obj.owner,
                AuthorityLevel::Active => &account_obj.active,
            };
            let lookup = |id: AccountId| self.objects.find_account(id).map(|a| &a.active);
            if !authority_satisfied(authority, &keys, &lookup, max_depth) {
                return Err(ChainError::authority(format!(
                    "missing required {level:?} authority of account {account}"
                )));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // checkpoints
    // ------------------------------------------------------------------

    pub fn add_checkpoints(&mut self, checkpoints: &BTreeMap<u32, BlockId>) {
        for (num, id) in checkpoints {
            self.checkpoints.insert(*num, *id);
        }
    }

    pub fn before_last_checkpoint(&self) -> bool {
        self.checkpoints
            .iter()
            .next_back()
            .map(|(num, _)| *num >= self.head_block_num())
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // lookups shared with collaborators
    // ------------------------------------------------------------------

    /// Read access to the object store for observers and queries.
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn pending_transactions(&self) -> &[ProcessedTransaction] {
        &self.pending_tx
    }

    /// Whether a speculative pending session is currently open.
    pub fn has_pending_session(&self) -> bool {
        self.pending_tx_session.is_some()
    }

    pub fn is_known_block(&self, id: &BlockId) -> bool {
        self.fork_db.is_known_block(id)
            || self.block_store.fetch_optional(id).map(|b| b.is_some()).unwrap_or(false)
    }

    /// Only true while the transaction sits in the duplicate-detection
    /// index, i.e. until its expiration passes head time. Older history
    /// must be queried by block.
    pub fn is_known_transaction(&self, id: &TransactionId) -> bool {
        self.objects.find_transaction_instance(id).is_some()
    }

    pub fn get_recent_transaction(&self, id: &TransactionId) -> ChainResult<SignedTransaction> {
        let instance = self
            .objects
            .find_transaction_instance(id)
            .ok_or_else(|| ChainError::tapos(format!("transaction {id} is not recent")))?;
        let obj = self
            .objects
            .find_transaction_object(instance)
            .ok_or_else(|| ChainError::internal("transaction index points at nothing"))?;
        Ok(obj.trx.clone())
    }
}
