//! Lifecycle notification contracts.
//!
//! Observers run after the critical section, on the serialising thread.
//! Every reference handed to a callback is valid only for the duration of
//! that callback; subscribers must copy out what they need and must not
//! block block application.

use crate::database::Database;
use crate::protocol::{Operation, OperationResult, SignedBlock, SignedTransaction};

/// One recorded operation from the per-block applied-ops log.
///
/// Entries can be individually cleared (a failed proposal erases the ops it
/// recorded), which is why consumers see `Option<AppliedOperation>` slots.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedOperation {
    pub op: Operation,
    pub result: OperationResult,
    pub block_num: u32,
    pub trx_in_block: u16,
    pub op_in_trx: u16,
    /// Monotonic within a block; virtual operations get their own numbers.
    pub virtual_op: u32,
}

#[allow(unused_variables)]
pub trait ChainObserver: Send + Sync {
    /// The block is now irreversibly part of the applied state.
    fn applied_block(
        &self,
        db: &Database,
        block: &SignedBlock,
        applied_ops: &[Option<AppliedOperation>],
    ) {
    }

    /// Fires once per block with every mutated and removed object id.
    fn changed_objects(
        &self,
        db: &Database,
        changed: &[lib_types::ObjectId],
        removed: &[lib_types::ObjectId],
    ) {
    }

    /// A transaction entered the pending pool.
    fn pending_transaction(&self, db: &Database, trx: &SignedTransaction) {}
}
