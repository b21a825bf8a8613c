//! Asset creation and price feed evaluation.

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::evaluator::{OperationEvaluator, TransactionEvalState};
use crate::object::{AnyObject, AssetObject, FeedEntry};
use crate::protocol::{Operation, OperationResult};
use lib_types::{AssetAmount, AssetId, ObjectType, Price};
use std::collections::BTreeMap;

pub struct AssetCreateEvaluator;

impl OperationEvaluator for AssetCreateEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::AssetCreate(op) = op else {
            return Err(ChainError::internal("asset-create evaluator got wrong tag"));
        };

        db.objects.get_account(op.issuer)?;
        if db.objects.find_asset_by_symbol(&op.symbol).is_some() {
            return Err(ChainError::economic(format!(
                "asset symbol {:?} already registered",
                op.symbol
            )));
        }
        if op.core_exchange_rate.quote.asset_id != AssetId::CORE {
            return Err(ChainError::economic(
                "core exchange rate must quote the core asset",
            ));
        }

        let (symbol, precision, issuer, supply) =
            (op.symbol.clone(), op.precision, op.issuer, op.initial_supply);
        let rate = op.core_exchange_rate;
        let id = db.objects.create(ObjectType::Asset, |instance| {
            AnyObject::Asset(AssetObject {
                id: AssetId(instance),
                symbol,
                precision,
                issuer,
                current_supply: supply,
                // the rate's base is denominated in the asset being born,
                // whose id is only known now
                core_exchange_rate: Price::new(
                    AssetAmount::new(rate.base.amount, AssetId(instance)),
                    rate.quote,
                ),
                feeds: BTreeMap::new(),
            })
        })?;

        if op.initial_supply > 0 {
            let minted = AssetAmount::new(op.initial_supply, AssetId(id.instance));
            db.objects.modify_account(op.issuer, |a| a.adjust_balance(minted))?;
        }
        Ok(OperationResult::Id(id))
    }
}

pub struct AssetPublishFeedEvaluator;

impl OperationEvaluator for AssetPublishFeedEvaluator {
    fn evaluate(
        &self,
        db: &mut Database,
        _state: &mut TransactionEvalState,
        op: &Operation,
    ) -> ChainResult<OperationResult> {
        let Operation::AssetPublishFeed(op) = op else {
            return Err(ChainError::internal("asset-publish-feed evaluator got wrong tag"));
        };

        db.objects.get_account(op.publisher)?;
        if db.objects.find_witness_by_account(op.publisher).is_none() {
            return Err(ChainError::economic(format!(
                "feed publisher {} is not a witness account",
                op.publisher
            )));
        }
        let asset = db.objects.get_asset(op.asset)?;
        if asset.id == AssetId::CORE {
            return Err(ChainError::economic("cannot publish a feed for the core asset"));
        }
        if op.core_exchange_rate.base.asset_id != op.asset
            || op.core_exchange_rate.quote.asset_id != AssetId::CORE
        {
            return Err(ChainError::economic(
                "feed must price the asset against the core asset",
            ));
        }

        let now = db.head_block_time();
        let (publisher, rate) = (op.publisher, op.core_exchange_rate);
        db.objects.modify_asset(op.asset, |asset| {
            asset
                .feeds
                .insert(publisher, FeedEntry { published: now, core_exchange_rate: rate });
        })?;
        Ok(OperationResult::Void)
    }
}
