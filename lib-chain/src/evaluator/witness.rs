//! Witness registration evaluation.

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::evaluator::{OperationEvaluator, TransactionEvalState};
use crate::object::{AnyObject, WitnessObject};
use crate::protocol::{Operation, OperationResult};
use lib_types::{ObjectType, WitnessId};

pub struct WitnessCreateEvaluator;

impl OperationEvaluator for WitnessCreateEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::WitnessCreate(op) = op else {
            return Err(ChainError::internal("witness-create evaluator got wrong tag"));
        };

        db.objects.get_account(op.witness_account)?;
        if db.objects.find_witness_by_account(op.witness_account).is_some() {
            return Err(ChainError::economic(format!(
                "account {} already controls a witness",
                op.witness_account
            )));
        }

        let (account, signing_key, url) = (op.witness_account, op.signing_key, op.url.clone());
        let id = db.objects.create(ObjectType::Witness, |instance| {
            AnyObject::Witness(WitnessObject {
                id: WitnessId(instance),
                witness_account: account,
                signing_key,
                url,
                vote_count: 0,
                last_confirmed_block_num: 0,
                total_missed: 0,
            })
        })?;
        Ok(OperationResult::Id(id))
    }
}

pub struct WitnessUpdateEvaluator;

impl OperationEvaluator for WitnessUpdateEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::WitnessUpdate(op) = op else {
            return Err(ChainError::internal("witness-update evaluator got wrong tag"));
        };

        let witness = db.objects.get_witness(op.witness)?;
        if witness.witness_account != op.witness_account {
            return Err(ChainError::economic(format!(
                "witness {} is not controlled by account {}",
                op.witness, op.witness_account
            )));
        }

        db.objects.modify_witness(op.witness, |witness| {
            if let Some(key) = op.new_signing_key {
                witness.signing_key = key;
            }
            if let Some(url) = &op.new_url {
                witness.url = url.clone();
            }
        })?;
        Ok(OperationResult::Void)
    }
}
