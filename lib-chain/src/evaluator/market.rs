//! Limit order evaluation and the matching engine.
//!
//! A new order is matched against the opposite side of its market, best
//! resting offer first, and always fills at the resting (maker) price.
//! Every (partial) fill records a `fill_order` virtual operation for each
//! party. Whatever remains unmatched rests on the book, unless the order
//! was fill-or-kill.

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::evaluator::{OperationEvaluator, TransactionEvalState};
use crate::object::{AnyObject, LimitOrderObject};
use crate::protocol::operations::FillOrderOperation;
use crate::protocol::{Operation, OperationResult};
use lib_types::{Amount, AssetAmount, LimitOrderId, ObjectType};
use std::cmp::Ordering;

pub struct LimitOrderCreateEvaluator;

impl OperationEvaluator for LimitOrderCreateEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::LimitOrderCreate(op) = op else {
            return Err(ChainError::internal("limit-order-create evaluator got wrong tag"));
        };

        let seller = db.objects.get_account(op.seller)?;
        db.objects.get_asset(op.amount_to_sell.asset_id)?;
        db.objects.get_asset(op.min_to_receive.asset_id)?;

        if op.expiration <= db.head_block_time() {
            return Err(ChainError::economic("limit order expired on arrival"));
        }
        let balance = seller.balance(op.amount_to_sell.asset_id);
        if balance < op.amount_to_sell.amount {
            return Err(ChainError::economic(format!(
                "account {} holds {} of {}, cannot offer {}",
                op.seller, balance, op.amount_to_sell.asset_id, op.amount_to_sell.amount
            )));
        }

        // escrow the sale amount into the order
        db.objects.modify_account(op.seller, |a| {
            a.adjust_balance(AssetAmount::new(
                -op.amount_to_sell.amount,
                op.amount_to_sell.asset_id,
            ))
        })?;

        let seller_id = op.seller;
        let sell_price = op.sell_price();
        let for_sale = op.amount_to_sell.amount;
        let expiration = op.expiration;
        let order_oid = db.objects.create(ObjectType::LimitOrder, |instance| {
            AnyObject::LimitOrder(LimitOrderObject {
                id: LimitOrderId(instance),
                seller: seller_id,
                for_sale,
                sell_price,
                expiration,
            })
        })?;
        let order_id = LimitOrderId(order_oid.instance);

        let fully_filled = match_new_order(db, order_id)?;
        if op.fill_or_kill && !fully_filled {
            return Err(ChainError::economic("fill-or-kill order not fully matched"));
        }

        Ok(OperationResult::Id(order_oid))
    }
}

pub struct LimitOrderCancelEvaluator;

impl OperationEvaluator for LimitOrderCancelEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::LimitOrderCancel(op) = op else {
            return Err(ChainError::internal("limit-order-cancel evaluator got wrong tag"));
        };

        let order = db.objects.get_limit_order(op.order)?;
        if order.seller != op.account {
            return Err(ChainError::economic(format!(
                "order {} belongs to {}, not {}",
                op.order, order.seller, op.account
            )));
        }
        let refunded = cancel_limit_order(db, op.order)?;
        Ok(OperationResult::Amount(refunded))
    }
}

/// Refund an order's remaining escrow to its seller and delete it.
pub fn cancel_limit_order(db: &mut Database, id: LimitOrderId) -> ChainResult<AssetAmount> {
    let order = db.objects.get_limit_order(id)?.clone();
    let refund = order.amount_for_sale();
    db.objects.modify_account(order.seller, |a| a.adjust_balance(refund))?;
    db.objects.remove(id.object_id())?;
    Ok(refund)
}

/// Match a freshly created order against the opposite book. Returns true
/// when the order filled completely (and so no longer exists).
fn match_new_order(db: &mut Database, order_id: LimitOrderId) -> ChainResult<bool> {
    loop {
        let order = db.objects.get_limit_order(order_id)?.clone();
        let (sell_asset, receive_asset) = order.sell_price.market();

        let Some(maker_id) = db.objects.orders_in_market(receive_asset, sell_asset).next()
        else {
            return Ok(false);
        };
        let maker = db.objects.get_limit_order(maker_id)?.clone();

        // no overlap: the taker demands more than the best maker pays
        if order.sell_price.cmp_rate(&maker.sell_price.invert()) == Ordering::Less {
            return Ok(false);
        }

        // how much of the taker's asset the maker is still asking for
        let maker_wants = maker.amount_to_receive().amount;
        if maker_wants == 0 {
            // unfillable dust; refund and drop the maker
            cancel_limit_order(db, maker_id)?;
            continue;
        }

        let trade_taker: Amount = order.for_sale.min(maker_wants);
        // fill at the maker's price; a fully filled maker yields its whole
        // remainder so no dust is stranded by rounding
        let trade_maker: Amount = if trade_taker == maker_wants {
            maker.for_sale
        } else {
            (trade_taker as i128 * maker.sell_price.base.amount as i128
                / maker.sell_price.quote.amount as i128) as Amount
        };
        if trade_maker == 0 {
            // rounding would hand the maker's counterparty nothing
            return Ok(false);
        }

        fill_order(
            db,
            maker_id,
            AssetAmount::new(trade_maker, receive_asset),
            AssetAmount::new(trade_taker, sell_asset),
        )?;
        let taker_gone = fill_order(
            db,
            order_id,
            AssetAmount::new(trade_taker, sell_asset),
            AssetAmount::new(trade_maker, receive_asset),
        )?;
        if taker_gone {
            return Ok(true);
        }
    }
}

/// Settle one side of a match: the order pays from its escrow, its seller
/// is credited with the proceeds, and a virtual fill is recorded. Returns
/// true when the order is spent and removed.
fn fill_order(
    db: &mut Database,
    id: LimitOrderId,
    pays: AssetAmount,
    receives: AssetAmount,
) -> ChainResult<bool> {
    let order = db.objects.get_limit_order(id)?.clone();
    if pays.amount > order.for_sale {
        return Err(ChainError::internal(format!(
            "order {id} pays {} with only {} escrowed",
            pays.amount, order.for_sale
        )));
    }

    db.objects.modify_account(order.seller, |a| a.adjust_balance(receives))?;
    db.record_virtual_operation(Operation::FillOrder(FillOrderOperation {
        order: id,
        account: order.seller,
        pays,
        receives,
    }));

    let remaining = order.for_sale - pays.amount;
    if remaining == 0 {
        db.objects.remove(id.object_id())?;
        Ok(true)
    } else {
        db.objects.modify_limit_order(id, |o| o.for_sale = remaining)?;
        Ok(false)
    }
}
