//! Withdraw permission evaluation.

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::evaluator::{OperationEvaluator, TransactionEvalState};
use crate::object::{AnyObject, WithdrawPermissionObject};
use crate::protocol::{Operation, OperationResult};
use lib_types::{AssetAmount, ObjectType, WithdrawPermissionId};

pub struct WithdrawPermissionCreateEvaluator;

impl OperationEvaluator for WithdrawPermissionCreateEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::WithdrawPermissionCreate(op) = op else {
            return Err(ChainError::internal(
                "withdraw-permission-create evaluator got wrong tag",
            ));
        };

        db.objects.get_account(op.withdraw_from)?;
        db.objects.get_account(op.authorized)?;
        db.objects.get_asset(op.withdrawal_limit.asset_id)?;
        if op.period_start_time < db.head_block_time() {
            return Err(ChainError::economic("withdraw period starts in the past"));
        }

        let expiration = op.period_start_time
            + op.withdrawal_period_sec
                .saturating_mul(op.periods_until_expiration);
        let (withdraw_from, authorized, limit, period_sec, start) = (
            op.withdraw_from,
            op.authorized,
            op.withdrawal_limit,
            op.withdrawal_period_sec,
            op.period_start_time,
        );
        let id = db.objects.create(ObjectType::WithdrawPermission, |instance| {
            AnyObject::WithdrawPermission(WithdrawPermissionObject {
                id: WithdrawPermissionId(instance),
                withdraw_from,
                authorized,
                withdrawal_limit: limit,
                withdrawal_period_sec: period_sec,
                period_start_time: start,
                expiration,
                claimed_this_period: 0,
            })
        })?;
        Ok(OperationResult::Id(id))
    }
}

pub struct WithdrawPermissionClaimEvaluator;

impl OperationEvaluator for WithdrawPermissionClaimEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::WithdrawPermissionClaim(op) = op else {
            return Err(ChainError::internal(
                "withdraw-permission-claim evaluator got wrong tag",
            ));
        };

        let now = db.head_block_time();
        let permission = db.objects.get_withdraw_permission(op.permission)?.clone();
        if permission.withdraw_from != op.withdraw_from {
            return Err(ChainError::economic("claim names the wrong source account"));
        }
        if permission.authorized != op.to {
            return Err(ChainError::economic(format!(
                "account {} is not authorized by permission {}",
                op.to, op.permission
            )));
        }
        if now < permission.period_start_time || now >= permission.expiration {
            return Err(ChainError::economic("withdraw permission is not active"));
        }
        if op.amount.asset_id != permission.withdrawal_limit.asset_id {
            return Err(ChainError::economic("claim asset differs from the permitted asset"));
        }
        if op.amount.amount > permission.available_this_period() {
            return Err(ChainError::economic(format!(
                "claim of {} exceeds the {} still available this period",
                op.amount.amount,
                permission.available_this_period()
            )));
        }

        let source = db.objects.get_account(op.withdraw_from)?;
        if source.balance(op.amount.asset_id) < op.amount.amount {
            return Err(ChainError::economic("source account cannot cover the claim"));
        }

        db.objects.modify_account(op.withdraw_from, |a| {
            a.adjust_balance(AssetAmount::new(-op.amount.amount, op.amount.asset_id))
        })?;
        db.objects.modify_account(op.to, |a| a.adjust_balance(op.amount))?;
        db.objects.modify_withdraw_permission(op.permission, |p| {
            p.claimed_this_period += op.amount.amount;
        })?;
        Ok(OperationResult::Amount(op.amount))
    }
}
