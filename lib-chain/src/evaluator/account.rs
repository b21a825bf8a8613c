//! Account lifecycle evaluation.

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::evaluator::{OperationEvaluator, TransactionEvalState};
use crate::object::{AccountObject, AnyObject};
use crate::protocol::{Operation, OperationResult};
use lib_types::{AccountId, ObjectType};
use std::collections::{BTreeMap, BTreeSet};

pub struct AccountCreateEvaluator;

impl OperationEvaluator for AccountCreateEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::AccountCreate(op) = op else {
            return Err(ChainError::internal("account-create evaluator got wrong tag"));
        };

        db.objects.get_account(op.registrar)?;
        if db.objects.find_account_by_name(&op.name).is_some() {
            return Err(ChainError::economic(format!(
                "account name {:?} already registered",
                op.name
            )));
        }
        // every account referenced from the new authorities must exist
        for referenced in op.owner.account_auths.keys().chain(op.active.account_auths.keys()) {
            db.objects.get_account(*referenced)?;
        }

        let (name, owner, active) = (op.name.clone(), op.owner.clone(), op.active.clone());
        let id = db.objects.create(ObjectType::Account, |instance| {
            AnyObject::Account(AccountObject {
                id: AccountId(instance),
                name,
                owner,
                active,
                votes: BTreeSet::new(),
                balances: BTreeMap::new(),
            })
        })?;
        Ok(OperationResult::Id(id))
    }
}

pub struct AccountUpdateEvaluator;

impl OperationEvaluator for AccountUpdateEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::AccountUpdate(op) = op else {
            return Err(ChainError::internal("account-update evaluator got wrong tag"));
        };

        db.objects.get_account(op.account)?;
        for auth in op.owner.iter().chain(op.active.iter()) {
            for referenced in auth.account_auths.keys() {
                db.objects.get_account(*referenced)?;
            }
        }
        if let Some(votes) = &op.new_votes {
            for witness in votes {
                db.objects.get_witness(*witness)?;
            }
        }

        db.objects.modify_account(op.account, |account| {
            if let Some(owner) = &op.owner {
                account.owner = owner.clone();
            }
            if let Some(active) = &op.active {
                account.active = active.clone();
            }
            if let Some(votes) = &op.new_votes {
                account.votes = votes.clone();
            }
        })?;
        Ok(OperationResult::Void)
    }
}
