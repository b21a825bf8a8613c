//! Chain error taxonomy.
//!
//! Everything below `Internal` is recoverable: the innermost undo session
//! rolls back and the error is returned to the caller of the public entry
//! point. `Internal` means an invariant the database relies on has already
//! been violated; callers should treat it as fatal and stop the node rather
//! than keep mutating possibly corrupt state.

use lib_types::{BlockId, ObjectId, TransactionId};
use thiserror::Error;

pub type ChainResult<T> = Result<T, ChainError>;

#[derive(Error, Debug)]
pub enum ChainError {
    /// Malformed block, transaction, or operation. Never retried.
    #[error("structural validation failed: {0}")]
    Structural(String),

    /// Missing or insufficient signatures for a required authority.
    #[error("authority check failed: {0}")]
    Authority(String),

    /// Transaction is stale, expired, or references unknown history.
    #[error("TaPoS/expiration check failed: {0}")]
    Tapos(String),

    /// Transaction already applied within its expiration window.
    #[error("duplicate transaction {0}")]
    Duplicate(TransactionId),

    /// An evaluator rejected the operation on business grounds.
    #[error("operation rejected: {0}")]
    Economic(String),

    /// A block arrived that does not link to any known fork item. The caller
    /// should fetch missing ancestors and retry.
    #[error("unlinked block {id}: unknown previous block")]
    Unlinked { id: BlockId },

    /// A fork switch failed part-way; the previous head state has been
    /// restored and the block that broke the new branch is reported inside.
    #[error("fork switch failed, previous head restored")]
    ForkSwitch(#[source] Box<ChainError>),

    /// Block id does not match a configured checkpoint. Fatal for the fork.
    #[error("block {block_id} violates checkpoint at height {height} ({expected})")]
    CheckpointViolation {
        height: u32,
        expected: BlockId,
        block_id: BlockId,
    },

    /// Proposals nested deeper than the schedule allows. Fatal for the
    /// containing transaction.
    #[error("proposal nesting depth {depth} exceeds limit {limit}")]
    ProposalNestingExceeded { depth: u32, limit: u32 },

    /// Broken internal invariant. Fatal.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl ChainError {
    pub fn structural(msg: impl Into<String>) -> Self {
        ChainError::Structural(msg.into())
    }

    pub fn authority(msg: impl Into<String>) -> Self {
        ChainError::Authority(msg.into())
    }

    pub fn tapos(msg: impl Into<String>) -> Self {
        ChainError::Tapos(msg.into())
    }

    pub fn economic(msg: impl Into<String>) -> Self {
        ChainError::Economic(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ChainError::Internal(msg.into())
    }

    pub fn missing_object(id: ObjectId) -> Self {
        ChainError::Economic(format!("referenced object {id} does not exist"))
    }

    /// True for the kinds a node must not continue applying blocks after.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChainError::CheckpointViolation { .. } | ChainError::Internal(_)
        )
    }
}

impl From<lib_storage::StoreError> for ChainError {
    fn from(e: lib_storage::StoreError) -> Self {
        ChainError::Internal(format!("block store: {e}"))
    }
}
