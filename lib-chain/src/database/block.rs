//! Block and transaction application, fork switching, block production.

use crate::database::{Database, PROPOSAL_FAIL_CLEANUP_HARDFORK};
use crate::error::{ChainError, ChainResult};
use crate::evaluator::TransactionEvalState;
use crate::object::{AnyObject, BlockSummaryObject, TransactionObject};
use crate::protocol::{Operation, OperationResult, ProcessedTransaction, SignedBlock, SignedTransaction};
use crate::serial;
use crate::skip::*;
use lib_crypto::PrivateKey;
use lib_types::{ObjectId, ObjectType, ProposalId, TimePointSec, WitnessId};
use tracing::{debug, info, warn};

/// Hard cap on a single transaction's canonical size.
const MAX_TRANSACTION_SIZE: u64 = 1024 * 1024;

impl Database {
    // ==================================================================
    // push_block
    // ==================================================================

    /// Ingest a block. Returns `true` when the push switched forks.
    ///
    /// May fail, in which case every partial change is unwound; on success
    /// the block is persisted to the block store.
    pub fn push_block(&mut self, new_block: SignedBlock, skip: u32) -> ChainResult<bool> {
        self.with_skip_flags(skip, |db| {
            db.without_pending_transactions(|db| db._push_block(new_block))
        })
    }

    fn _push_block(&mut self, new_block: SignedBlock) -> ChainResult<bool> {
        let skip = self.skip_flags;
        let new_id = new_block.id();
        let new_head = self.fork_db.push_block(new_block)?;

        // does the longest chain still build off the applied head?
        if new_head.previous_id != self.head_block_id() {
            if new_head.num <= self.head_block_num() {
                // same height on a minority fork: remember it, change nothing
                return Ok(false);
            }
            return self.switch_forks(new_head.id).map(|_| true);
        }

        let item = self
            .fork_db
            .fetch_block(&new_id)
            .ok_or_else(|| ChainError::internal("pushed block vanished from fork database"))?;
        let session = self.objects.start_undo_session();
        match self.apply_block(&item.block, skip) {
            Ok(()) => {
                self.block_store
                    .store(item.id, &serial::canonical_bytes(&item.block))?;
                self.objects.commit_session(session);
                Ok(false)
            }
            Err(e) => {
                warn!(block = %new_id, error = %e, "failed to push new block");
                self.objects.undo_session(session);
                self.fork_db.remove(new_id);
                Err(e)
            }
        }
    }

    /// Replace the applied chain with the longer fork ending at `new_head`.
    /// On any failure the bad subtree is dropped, the old chain is
    /// restored, and the captured error is surfaced.
    fn switch_forks(&mut self, new_head_id: lib_types::BlockId) -> ChainResult<()> {
        let skip = self.skip_flags;
        warn!(to = %new_head_id, "switching to fork");
        let (new_branch, old_branch) =
            self.fork_db.fetch_branch_from(new_head_id, self.head_block_id())?;
        let common_previous = new_branch
            .last()
            .ok_or_else(|| ChainError::internal("fork switch with empty new branch"))?
            .previous_id;

        // pop blocks until we hit the common ancestor
        while self.head_block_id() != common_previous {
            info!(num = self.head_block_num(), id = %self.head_block_id(), "popping block");
            self.pop_block()?;
        }

        // push all blocks on the new fork, oldest first
        let mut failure: Option<(ChainError, lib_types::BlockId)> = None;
        for item in new_branch.iter().rev() {
            info!(num = item.num, id = %item.id, "pushing block from fork");
            let session = self.objects.start_undo_session();
            match self.apply_block(&item.block, skip) {
                Ok(()) => {
                    self.block_store
                        .store(item.id, &serial::canonical_bytes(&item.block))?;
                    self.objects.commit_session(session);
                }
                Err(e) => {
                    self.objects.undo_session(session);
                    failure = Some((e, item.id));
                    break;
                }
            }
        }
        let Some((error, failed_id)) = failure else {
            return Ok(());
        };

        warn!(block = %failed_id, error = %error, "exception thrown while switching forks");
        // the failed block and everything above it are invalid
        self.fork_db.remove(failed_id);
        if let Some(old_head) = old_branch.first() {
            self.fork_db.set_head(old_head.clone());
        }

        // pop whatever we already committed from the bad fork
        while self.head_block_id() != common_previous {
            info!(num = self.head_block_num(), id = %self.head_block_id(), "popping block");
            self.pop_block()?;
        }

        // restore all blocks from the good fork, oldest first
        for item in old_branch.iter().rev() {
            info!(num = item.num, id = %item.id, "restoring block");
            let session = self.objects.start_undo_session();
            self.apply_block(&item.block, skip)?;
            self.objects.commit_session(session);
        }
        Err(ChainError::ForkSwitch(Box::new(error)))
    }

    // ==================================================================
    // apply_block
    // ==================================================================

    /// Checkpoint gate around `_apply_block`. At or below the newest
    /// checkpoint everything is skipped once the id has been confirmed.
    pub(crate) fn apply_block(&mut self, block: &SignedBlock, mut skip: u32) -> ChainResult<()> {
        let block_num = block.block_num();
        if let Some((&newest_checkpoint, _)) = self.checkpoints.iter().next_back() {
            if let Some(expected) = self.checkpoints.get(&block_num) {
                if block.id() != *expected {
                    return Err(ChainError::CheckpointViolation {
                        height: block_num,
                        expected: *expected,
                        block_id: block.id(),
                    });
                }
            }
            if newest_checkpoint >= block_num {
                skip = SKIP_EVERYTHING;
            }
        }
        self.with_skip_flags(skip, |db| db._apply_block(block))
    }

    fn _apply_block(&mut self, block: &SignedBlock) -> ChainResult<()> {
        let skip = self.skip_flags;
        self.applied_ops.clear();
        self.current_virtual_op = 0;

        if skip & SKIP_BLOCK_SIZE_CHECK == 0 {
            let size = serial::canonical_size(block);
            let maximum = self.objects.global_properties().parameters.maximum_block_size as u64;
            if size > maximum {
                return Err(ChainError::structural(format!(
                    "block of {size} bytes exceeds maximum of {maximum}"
                )));
            }
        }
        if skip & SKIP_MERKLE_CHECK == 0
            && block.transaction_merkle_root != block.calculate_merkle_root()
        {
            return Err(ChainError::structural(format!(
                "merkle root mismatch in block {}",
                block.id()
            )));
        }

        let signing_witness = self.validate_block_header(skip, block)?;
        let maintenance_needed =
            self.objects.dynamic_properties().next_maintenance_time <= block.timestamp;

        self.current_block_num = block.block_num();
        self.current_trx_in_block = 0;

        for trx in &block.transactions {
            // no per-transaction undo session here: the whole block either
            // applies or fails as one unit
            self.apply_transaction(&trx.trx, skip)?;
            self.current_trx_in_block += 1;
        }

        let missed = self.update_witness_missed_blocks(block)?;
        self.update_global_dynamic_data(block, missed)?;
        self.update_signing_witness(signing_witness, block)?;
        self.update_last_irreversible_block()?;

        if maintenance_needed {
            self.perform_chain_maintenance(block)?;
        }

        self.create_block_summary(block)?;
        self.clear_expired_transactions()?;
        self.clear_expired_proposals()?;
        self.clear_expired_orders()?;
        self.update_expired_feeds()?;
        self.update_core_exchange_rates()?;
        self.update_withdraw_permissions()?;
        self.update_maintenance_flag(maintenance_needed)?;
        self.update_witness_schedule()?;
        if self.has_debug_updates() {
            self.apply_debug_updates()?;
        }

        self.notify_applied_block(block);
        self.applied_ops.clear();

        let (changed, removed) = self.objects.session_touched();
        self.notify_changed_objects(&changed, &removed);
        Ok(())
    }

    fn validate_block_header(&self, skip: u32, block: &SignedBlock) -> ChainResult<WitnessId> {
        if block.previous != self.head_block_id() {
            return Err(ChainError::internal(format!(
                "block {} does not link to head {}",
                block.previous,
                self.head_block_id()
            )));
        }
        if block.timestamp <= self.head_block_time() {
            return Err(ChainError::structural(format!(
                "block timestamp {} does not advance head time {}",
                block.timestamp,
                self.head_block_time()
            )));
        }
        let witness = self.objects.get_witness(block.witness)?;

        if skip & SKIP_WITNESS_SIGNATURE == 0 && !block.validate_signee(&witness.signing_key) {
            return Err(ChainError::authority(format!(
                "block {} is not signed by the key of witness {}",
                block.id(),
                block.witness
            )));
        }

        if skip & SKIP_WITNESS_SCHEDULE_CHECK == 0 {
            let slot = self.get_slot_at_time(block.timestamp);
            if slot == 0 {
                return Err(ChainError::structural("block timestamp is before the first slot"));
            }
            if block.timestamp != self.get_slot_time(slot) {
                return Err(ChainError::structural("block timestamp is not slot-aligned"));
            }
            let scheduled = self.get_scheduled_witness(slot)?;
            if scheduled != block.witness {
                return Err(ChainError::structural(format!(
                    "witness {} produced a block in slot {slot} scheduled for {scheduled}",
                    block.witness
                )));
            }
        }
        Ok(block.witness)
    }

    // ==================================================================
    // transactions
    // ==================================================================

    /// Push a transaction into the pending pool.
    ///
    /// Applied under a temporary child of the pending session; on failure
    /// the child rolls back and the pool is untouched.
    pub fn push_transaction(
        &mut self,
        trx: SignedTransaction,
        skip: u32,
    ) -> ChainResult<ProcessedTransaction> {
        if serial::canonical_size(&trx) >= MAX_TRANSACTION_SIZE {
            return Err(ChainError::structural(
                "transaction exceeds maximum transaction size",
            ));
        }
        self.with_skip_flags(skip, |db| db._push_transaction(trx))
    }

    fn _push_transaction(&mut self, trx: SignedTransaction) -> ChainResult<ProcessedTransaction> {
        // the first transaction after a block opens the pending session, so
        // a new block can rewind to clean head state in one undo
        if self.pending_tx_session.is_none() {
            self.pending_tx_session = Some(self.objects.start_undo_session());
        }

        let temp_session = self.objects.start_undo_session();
        match self._apply_transaction(&trx) {
            Ok(processed) => {
                self.pending_tx.push(processed.clone());
                self.objects.merge_session(temp_session);
                self.notify_pending_transaction(&trx);
                Ok(processed)
            }
            Err(e) => {
                self.objects.undo_session(temp_session);
                Err(e)
            }
        }
    }

    /// Apply a transaction under a throwaway session: full validation, no
    /// lasting state change.
    pub fn validate_transaction(
        &mut self,
        trx: &SignedTransaction,
    ) -> ChainResult<ProcessedTransaction> {
        let session = self.objects.start_undo_session();
        let result = self._apply_transaction(trx);
        self.objects.undo_session(session);
        result
    }

    pub(crate) fn apply_transaction(
        &mut self,
        trx: &SignedTransaction,
        skip: u32,
    ) -> ChainResult<ProcessedTransaction> {
        self.with_skip_flags(skip, |db| db._apply_transaction(trx))
    }

    fn _apply_transaction(&mut self, trx: &SignedTransaction) -> ChainResult<ProcessedTransaction> {
        let skip = self.skip_flags;

        trx.validate()?;

        if skip & SKIP_TRANSACTION_DUPE_CHECK == 0
            && self.objects.find_transaction_instance(&trx.id()).is_some()
        {
            return Err(ChainError::Duplicate(trx.id()));
        }

        if skip & SKIP_TRANSACTION_SIGNATURES == 0 {
            self.verify_authority(trx)?;
        }

        // block 1 carries no TaPoS or expiration checks: no history exists
        // for a transaction to be stale against
        if self.head_block_num() > 0 {
            if skip & SKIP_TAPOS_CHECK == 0 {
                let summary = self
                    .objects
                    .find_block_summary(trx.ref_block_num as u64)
                    .ok_or_else(|| {
                        ChainError::tapos(format!(
                            "no block summary for ref_block_num {}",
                            trx.ref_block_num
                        ))
                    })?;
                if trx.ref_block_prefix != summary.block_id.tapos_prefix() {
                    return Err(ChainError::tapos(format!(
                        "transaction {} references a different fork",
                        trx.id()
                    )));
                }
            }

            let now = self.head_block_time();
            let max_expiration =
                self.objects.global_properties().parameters.maximum_time_until_expiration;
            if trx.expiration.secs() > now.secs() + max_expiration {
                return Err(ChainError::tapos(format!(
                    "expiration {} is too far beyond head time {now}",
                    trx.expiration
                )));
            }
            if now >= trx.expiration {
                return Err(ChainError::tapos(format!(
                    "transaction expired at {} (head time {now})",
                    trx.expiration
                )));
            }
        }

        if skip & SKIP_TRANSACTION_DUPE_CHECK == 0 {
            let (trx_id, expiration, stored) = (trx.id(), trx.expiration, trx.clone());
            self.objects.create(ObjectType::Transaction, |instance| {
                AnyObject::Transaction(TransactionObject {
                    instance,
                    trx_id,
                    expiration,
                    trx: stored,
                })
            })?;
        }

        let mut state = TransactionEvalState::default();
        let mut processed = ProcessedTransaction {
            trx: trx.clone(),
            operation_results: Vec::with_capacity(trx.operations.len()),
        };
        self.current_op_in_trx = 0;
        for op in &trx.operations {
            let result = self.apply_operation(&mut state, op)?;
            processed.operation_results.push(result);
            self.current_op_in_trx += 1;
        }
        Ok(processed)
    }

    pub(crate) fn apply_operation(
        &mut self,
        state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let registry = self.evaluators.clone();
        let evaluator = registry.get(op.tag())?;
        let index = self.push_applied_operation(op.clone());
        let result = evaluator.evaluate(self, state, op)?;
        self.set_applied_operation_result(index, result.clone());
        Ok(result)
    }

    // ==================================================================
    // proposals
    // ==================================================================

    /// Execute an approved proposal's operations inside a nested undo
    /// session. Recursion (a proposal approving a proposal) is bounded at
    /// twice the active witness count.
    pub(crate) fn push_proposal(&mut self, proposal_id: ProposalId) -> ChainResult<()> {
        let limit = self.objects.global_properties().active_witnesses.len() as u32 * 2;
        if self.proposal_nesting_depth >= limit {
            return Err(ChainError::ProposalNestingExceeded {
                depth: self.proposal_nesting_depth + 1,
                limit,
            });
        }
        self.proposal_nesting_depth += 1;
        let result = self.push_proposal_nested(proposal_id);
        self.proposal_nesting_depth -= 1;
        result
    }

    fn push_proposal_nested(&mut self, proposal_id: ProposalId) -> ChainResult<()> {
        let proposal = self.objects.get_proposal(proposal_id)?.clone();
        let old_applied_ops = self.applied_ops.len();

        // a nested proposal may not fit under the committed-session cap;
        // lift it for the duration
        if self.objects.undo_depth() >= self.objects.max_undo_size() {
            let depth = self.objects.undo_depth();
            self.objects.set_max_undo_size(depth + 1);
        }

        let session = self.objects.start_undo_session();
        let mut state = TransactionEvalState { is_proposed_trx: true };
        let mut failure: Option<ChainError> = None;
        for op in &proposal.proposed_ops {
            if let Err(e) = self.apply_operation(&mut state, op) {
                failure = Some(e);
                break;
            }
        }
        if failure.is_none() {
            if let Err(e) = self.objects.remove(proposal_id.object_id()) {
                failure = Some(e);
            }
        }

        match failure {
            None => {
                self.objects.merge_session(session);
                Ok(())
            }
            Some(error) => {
                self.objects.undo_session(session);
                // the log must replay exactly as it did historically
                if self.head_block_time() <= PROPOSAL_FAIL_CLEANUP_HARDFORK {
                    for index in old_applied_ops..self.applied_ops.len() {
                        debug!(index, "removing failed operation from applied-ops log");
                        self.applied_ops[index] = None;
                    }
                } else {
                    self.applied_ops.truncate(old_applied_ops);
                }
                warn!(proposal = %proposal_id, error = %error, "proposal execution failed");
                Err(error)
            }
        }
    }

    // ==================================================================
    // block production
    // ==================================================================

    pub fn generate_block(
        &mut self,
        when: TimePointSec,
        witness_id: WitnessId,
        signing_key: &PrivateKey,
        skip: u32,
    ) -> ChainResult<SignedBlock> {
        self.with_skip_flags(skip, |db| db._generate_block(when, witness_id, signing_key))
    }

    fn _generate_block(
        &mut self,
        when: TimePointSec,
        witness_id: WitnessId,
        signing_key: &PrivateKey,
    ) -> ChainResult<SignedBlock> {
        let skip = self.skip_flags;

        let slot = self.get_slot_at_time(when);
        if slot == 0 {
            return Err(ChainError::structural("generation time is not in a future slot"));
        }
        let scheduled = self.get_scheduled_witness(slot)?;
        if scheduled != witness_id {
            return Err(ChainError::structural(format!(
                "witness {witness_id} is not scheduled for slot {slot} ({scheduled} is)"
            )));
        }

        // Pending transactions are re-applied below because their validity
        // may have changed since arrival: time-based checks depend on the
        // block time chosen here. Throw the speculative state away first.
        if let Some(session) = self.pending_tx_session.take() {
            self.objects.undo_session(session);
        }

        if skip & SKIP_WITNESS_SIGNATURE == 0 {
            let witness = self.objects.get_witness(witness_id)?;
            if witness.signing_key != signing_key.public_key() {
                return Err(ChainError::authority(format!(
                    "key does not match the signing key of witness {witness_id}"
                )));
            }
        }

        let maximum_block_size =
            self.objects.global_properties().parameters.maximum_block_size as u64;

        let mut pending_block = SignedBlock {
            previous: self.head_block_id(),
            timestamp: when,
            witness: witness_id,
            ..Default::default()
        };
        // fixed-width length prefixes make the size accounting exact: the
        // empty block already carries the transaction-list prefix
        let mut total_block_size = serial::canonical_size(&pending_block);

        self.pending_tx_session = Some(self.objects.start_undo_session());

        let mut postponed_tx_count = 0u64;
        let pool = self.pending_tx.clone();
        for tx in &pool {
            // postpone transactions that would make the block too big
            if total_block_size + serial::canonical_size(tx) > maximum_block_size {
                postponed_tx_count += 1;
                continue;
            }
            let temp_session = self.objects.start_undo_session();
            match self._apply_transaction(&tx.trx) {
                Ok(processed) => {
                    // results may have grown since the first measurement
                    let new_total = total_block_size + serial::canonical_size(&processed);
                    if new_total > maximum_block_size {
                        self.objects.undo_session(temp_session);
                        postponed_tx_count += 1;
                        continue;
                    }
                    self.objects.merge_session(temp_session);
                    total_block_size = new_total;
                    pending_block.transactions.push(processed);
                }
                Err(e) => {
                    self.objects.undo_session(temp_session);
                    warn!(trx = %tx.id(), error = %e, "transaction not processed while generating block");
                }
            }
        }
        if postponed_tx_count > 0 {
            warn!(count = postponed_tx_count, "postponed transactions due to block size limit");
        }

        // The speculative state no longer matches the (postponed) pool;
        // push_block below rebuilds the pending session from scratch.
        if let Some(session) = self.pending_tx_session.take() {
            self.objects.undo_session(session);
        }

        pending_block.transaction_merkle_root = pending_block.calculate_merkle_root();
        if skip & SKIP_WITNESS_SIGNATURE == 0 {
            pending_block.sign(signing_key);
        }

        // authority checks were already done transaction by transaction
        self.push_block(pending_block.clone(), skip | SKIP_TRANSACTION_SIGNATURES)?;
        Ok(pending_block)
    }

    // ==================================================================
    // pop_block
    // ==================================================================

    /// Remove the head block and undo its effects.
    ///
    /// The pending pool is dropped silently as a side effect (its session
    /// is rooted in the state being popped); the popped block's own
    /// transactions are queued for re-inclusion by the next push.
    pub fn pop_block(&mut self) -> ChainResult<()> {
        self.pending_tx.clear();
        if let Some(session) = self.pending_tx_session.take() {
            self.objects.undo_session(session);
        }

        let head_id = self.head_block_id();
        let fork_head = self
            .fork_db
            .head()
            .ok_or_else(|| ChainError::internal("pop_block on an empty fork database"))?;
        let item = if fork_head.id == head_id {
            self.fork_db.pop_block()?;
            fork_head
        } else {
            self.fork_db
                .fetch_block(&head_id)
                .ok_or_else(|| ChainError::internal("head block is not in the fork database"))?
        };

        self.objects.pop_commit()?;

        for tx in item.block.transactions.iter().rev() {
            self.popped_tx.push_front(tx.clone());
        }
        Ok(())
    }

    // ==================================================================
    // fork queries
    // ==================================================================

    /// Ids from the given fork head back to (and including) the common
    /// ancestor with the applied chain.
    pub fn get_block_ids_on_fork(
        &self,
        head_of_fork: lib_types::BlockId,
    ) -> ChainResult<Vec<lib_types::BlockId>> {
        let (ours, theirs) = self.fork_db.fetch_branch_from(self.head_block_id(), head_of_fork)?;
        let mut result: Vec<lib_types::BlockId> = theirs.iter().map(|item| item.id).collect();
        let ancestor = match (ours.last(), theirs.last()) {
            (Some(item), _) | (None, Some(item)) => item.previous_id,
            (None, None) => self.head_block_id(),
        };
        result.push(ancestor);
        Ok(result)
    }

    /// Remove a summary slot's worth of ambiguity: record this block's id
    /// for TaPoS references.
    pub(crate) fn create_block_summary(&mut self, block: &SignedBlock) -> ChainResult<()> {
        let instance = (block.block_num() & 0xffff) as u64;
        let id = ObjectId::new(ObjectType::BlockSummary, instance);
        let block_id = block.id();
        if self.objects.get(id).is_some() {
            self.objects.modify(id, |obj| {
                if let AnyObject::BlockSummary(summary) = obj {
                    summary.block_id = block_id;
                }
            })
        } else {
            self.objects
                .create_at(AnyObject::BlockSummary(BlockSummaryObject { instance, block_id }))
                .map(|_| ())
        }
    }
}
