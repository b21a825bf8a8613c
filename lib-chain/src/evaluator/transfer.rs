//! Transfer evaluation.

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::evaluator::{OperationEvaluator, TransactionEvalState};
use crate::protocol::{Operation, OperationResult};
use lib_types::AssetAmount;

pub struct TransferEvaluator;

impl OperationEvaluator for TransferEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::Transfer(op) = op else {
            return Err(ChainError::internal("transfer evaluator got wrong tag"));
        };

        let from = db.objects.get_account(op.from)?;
        db.objects.get_account(op.to)?;
        db.objects.get_asset(op.amount.asset_id)?;

        let balance = from.balance(op.amount.asset_id);
        if balance < op.amount.amount {
            return Err(ChainError::economic(format!(
                "account {} holds {} of {}, cannot transfer {}",
                op.from, balance, op.amount.asset_id, op.amount.amount
            )));
        }

        db.objects.modify_account(op.from, |a| {
            a.adjust_balance(AssetAmount::new(-op.amount.amount, op.amount.asset_id))
        })?;
        db.objects.modify_account(op.to, |a| a.adjust_balance(op.amount))?;

        Ok(OperationResult::Void)
    }
}
