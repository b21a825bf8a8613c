//! Operation dispatch.
//!
//! One evaluator per operation tag, held in a vector indexed by the tag.
//! The set is frozen per protocol version; the registry refuses tags it has
//! no evaluator for instead of guessing.

mod account;
mod asset;
mod market;
mod proposal;
mod transfer;
mod withdraw;
mod witness;

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::protocol::operations::OPERATION_COUNT;
use crate::protocol::{Operation, OperationResult};

pub use market::cancel_limit_order;

/// Per-transaction evaluation context.
#[derive(Debug, Default)]
pub struct TransactionEvalState {
    /// Set while executing an approved proposal's inner operations;
    /// approvals have already stood in for signatures.
    pub is_proposed_trx: bool,
}

pub trait OperationEvaluator: Send + Sync {
    fn evaluate(
        &self,
        db: &mut Database,
        state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult>;
}

pub struct EvaluatorRegistry {
    evaluators: Vec<Box<dyn OperationEvaluator>>,
}

impl EvaluatorRegistry {
    /// The registry for the current protocol version, in tag order.
    pub fn standard() -> Self {
        let evaluators: Vec<Box<dyn OperationEvaluator>> = vec![
            Box::new(transfer::TransferEvaluator),
            Box::new(market::LimitOrderCreateEvaluator),
            Box::new(market::LimitOrderCancelEvaluator),
            Box::new(account::AccountCreateEvaluator),
            Box::new(account::AccountUpdateEvaluator),
            Box::new(witness::WitnessCreateEvaluator),
            Box::new(witness::WitnessUpdateEvaluator),
            Box::new(proposal::ProposalCreateEvaluator),
            Box::new(proposal::ProposalUpdateEvaluator),
            Box::new(proposal::ProposalDeleteEvaluator),
            Box::new(withdraw::WithdrawPermissionCreateEvaluator),
            Box::new(withdraw::WithdrawPermissionClaimEvaluator),
            Box::new(asset::AssetCreateEvaluator),
            Box::new(asset::AssetPublishFeedEvaluator),
            Box::new(VirtualOperationEvaluator),
        ];
        debug_assert_eq!(evaluators.len(), OPERATION_COUNT);
        Self { evaluators }
    }

    pub fn get(&self, tag: usize) -> ChainResult<&dyn OperationEvaluator> {
        self.evaluators
            .get(tag)
            .map(|b| b.as_ref())
            .ok_or_else(|| ChainError::internal(format!("no evaluator registered for tag {tag}")))
    }
}

/// Virtual operations are recorded by the engine, never dispatched.
struct VirtualOperationEvaluator;

impl OperationEvaluator for VirtualOperationEvaluator {
    fn evaluate(
        &self,
        _db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        Err(ChainError::structural(format!(
            "virtual operation (tag {}) cannot be evaluated directly",
            op.tag()
        )))
    }
}
