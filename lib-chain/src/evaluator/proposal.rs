//! Proposal evaluation.
//!
//! A proposal parks a set of operations until every required account has
//! approved it; approvals arrive via `proposal_update`, and the moment the
//! set is satisfied the proposal executes inside a nested undo session (see
//! `Database::push_proposal`). An execution failure leaves the proposal in
//! place for a later attempt, except for nesting-limit violations, which
//! poison the containing transaction.

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::evaluator::{OperationEvaluator, TransactionEvalState};
use crate::object::{AnyObject, ProposalObject};
use crate::protocol::{Operation, OperationResult};
use lib_types::{ObjectType, ProposalId};
use std::collections::BTreeSet;
use tracing::warn;

pub struct ProposalCreateEvaluator;

impl OperationEvaluator for ProposalCreateEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::ProposalCreate(op) = op else {
            return Err(ChainError::internal("proposal-create evaluator got wrong tag"));
        };

        db.objects.get_account(op.proposer)?;
        if op.expiration_time <= db.head_block_time() {
            return Err(ChainError::economic("proposal expires in the past"));
        }

        let mut required_approvals = BTreeSet::new();
        for inner in &op.proposed_ops {
            for (account, _) in inner.required_authorities() {
                db.objects.get_account(account)?;
                required_approvals.insert(account);
            }
        }

        let (proposer, proposed_ops, expiration_time) =
            (op.proposer, op.proposed_ops.clone(), op.expiration_time);
        let id = db.objects.create(ObjectType::Proposal, |instance| {
            AnyObject::Proposal(ProposalObject {
                id: ProposalId(instance),
                proposer,
                proposed_ops,
                expiration_time,
                required_approvals,
                available_approvals: BTreeSet::new(),
            })
        })?;
        Ok(OperationResult::Id(id))
    }
}

pub struct ProposalUpdateEvaluator;

impl OperationEvaluator for ProposalUpdateEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::ProposalUpdate(op) = op else {
            return Err(ChainError::internal("proposal-update evaluator got wrong tag"));
        };

        let proposal = db.objects.get_proposal(op.proposal)?;
        for account in &op.approvals_to_add {
            if !proposal.required_approvals.contains(account) {
                return Err(ChainError::economic(format!(
                    "approval from {account} is not required by proposal {}",
                    op.proposal
                )));
            }
        }

        db.objects.modify_proposal(op.proposal, |proposal| {
            for account in &op.approvals_to_add {
                proposal.available_approvals.insert(*account);
            }
            for account in &op.approvals_to_remove {
                proposal.available_approvals.remove(account);
            }
        })?;

        let authorized = db.objects.get_proposal(op.proposal)?.is_authorized();
        if authorized {
            match db.push_proposal(op.proposal) {
                Ok(()) => {}
                Err(e @ ChainError::ProposalNestingExceeded { .. }) => return Err(e),
                Err(e) => {
                    // leave the proposal for a later attempt
                    warn!(proposal = %op.proposal, error = %e, "approved proposal failed to execute");
                }
            }
        }
        Ok(OperationResult::Void)
    }
}

pub struct ProposalDeleteEvaluator;

impl OperationEvaluator for ProposalDeleteEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::ProposalDelete(op) = op else {
            return Err(ChainError::internal("proposal-delete evaluator got wrong tag"));
        };

        let proposal = db.objects.get_proposal(op.proposal)?;
        if proposal.proposer != op.account && !proposal.required_approvals.contains(&op.account) {
            return Err(ChainError::economic(format!(
                "account {} may not delete proposal {}",
                op.account, op.proposal
            )));
        }
        db.objects.remove(op.proposal.object_id())?;
        Ok(OperationResult::Void)
    }
}
