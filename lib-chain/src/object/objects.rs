//! Typed chain state records.

use crate::authority::Authority;
use crate::protocol::{Operation, SignedTransaction};
use lib_crypto::PublicKey;
use lib_types::{
    AccountId, Amount, AssetAmount, AssetId, BlockId, ChainParameters, LimitOrderId, ObjectId,
    ObjectType, Price, ProposalId, TimePointSec, WithdrawPermissionId, WitnessId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountObject {
    pub id: AccountId,
    pub name: String,
    pub owner: Authority,
    pub active: Authority,
    /// Witnesses this account currently votes for.
    pub votes: BTreeSet<WitnessId>,
    pub balances: BTreeMap<AssetId, Amount>,
}

impl AccountObject {
    pub fn balance(&self, asset: AssetId) -> Amount {
        self.balances.get(&asset).copied().unwrap_or(0)
    }

    /// Apply a signed delta; negative balances are the caller's bug to
    /// prevent, not this accessor's.
    pub fn adjust_balance(&mut self, delta: AssetAmount) {
        let entry = self.balances.entry(delta.asset_id).or_insert(0);
        *entry += delta.amount;
        if *entry == 0 {
            self.balances.remove(&delta.asset_id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub published: TimePointSec,
    pub core_exchange_rate: Price,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetObject {
    pub id: AssetId,
    pub symbol: String,
    pub precision: u8,
    pub issuer: AccountId,
    pub current_supply: Amount,
    pub core_exchange_rate: Price,
    /// Published price feeds by witness account.
    pub feeds: BTreeMap<AccountId, FeedEntry>,
}

impl AssetObject {
    /// Median of the feeds no older than `max_age`, by rate.
    pub fn median_feed(&self, now: TimePointSec, max_age: u32) -> Option<Price> {
        let mut live: Vec<Price> = self
            .feeds
            .values()
            .filter(|f| now.saturating_sub(f.published) <= max_age)
            .map(|f| f.core_exchange_rate)
            .collect();
        if live.is_empty() {
            return None;
        }
        live.sort_by(|a, b| a.cmp_rate(b));
        Some(live[live.len() / 2])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessObject {
    pub id: WitnessId,
    pub witness_account: AccountId,
    pub signing_key: PublicKey,
    pub url: String,
    /// Tallied at each maintenance interval.
    pub vote_count: Amount,
    pub last_confirmed_block_num: u32,
    pub total_missed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderObject {
    pub id: LimitOrderId,
    pub seller: AccountId,
    /// Remaining unsold amount, denominated in `sell_price.base`.
    pub for_sale: Amount,
    pub sell_price: Price,
    pub expiration: TimePointSec,
}

impl LimitOrderObject {
    pub fn amount_for_sale(&self) -> AssetAmount {
        AssetAmount::new(self.for_sale, self.sell_price.base.asset_id)
    }

    /// What the remaining `for_sale` is asking for, rounded down.
    pub fn amount_to_receive(&self) -> AssetAmount {
        let receive = (self.for_sale as i128 * self.sell_price.quote.amount as i128
            / self.sell_price.base.amount as i128) as Amount;
        AssetAmount::new(receive, self.sell_price.quote.asset_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalObject {
    pub id: ProposalId,
    pub proposer: AccountId,
    pub proposed_ops: Vec<Operation>,
    pub expiration_time: TimePointSec,
    pub required_approvals: BTreeSet<AccountId>,
    pub available_approvals: BTreeSet<AccountId>,
}

impl ProposalObject {
    pub fn is_authorized(&self) -> bool {
        self.required_approvals.is_subset(&self.available_approvals)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawPermissionObject {
    pub id: WithdrawPermissionId,
    pub withdraw_from: AccountId,
    pub authorized: AccountId,
    /// Per-period cap.
    pub withdrawal_limit: AssetAmount,
    pub withdrawal_period_sec: u32,
    pub period_start_time: TimePointSec,
    pub expiration: TimePointSec,
    pub claimed_this_period: Amount,
}

impl WithdrawPermissionObject {
    pub fn available_this_period(&self) -> Amount {
        (self.withdrawal_limit.amount - self.claimed_this_period).max(0)
    }

    /// End of the period containing `period_start_time`.
    pub fn current_period_end(&self) -> TimePointSec {
        self.period_start_time + self.withdrawal_period_sec
    }
}

/// Entry in the duplicate-detection index. Lives until its transaction's
/// expiration passes head time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionObject {
    pub instance: u64,
    pub trx_id: lib_types::TransactionId,
    pub expiration: TimePointSec,
    pub trx: SignedTransaction,
}

/// Ring of recent block ids for TaPoS; instance is `block_num & 0xffff`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSummaryObject {
    pub instance: u64,
    pub block_id: BlockId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalPropertyObject {
    pub parameters: ChainParameters,
    pub active_witnesses: Vec<WitnessId>,
    /// Production order for the current round.
    pub current_shuffled_witnesses: Vec<WitnessId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicGlobalPropertyObject {
    pub head_block_number: u32,
    pub head_block_id: BlockId,
    pub time: TimePointSec,
    pub current_witness: WitnessId,
    pub next_maintenance_time: TimePointSec,
    pub last_irreversible_block_num: u32,
    /// Absolute slot number of the head block since genesis.
    pub current_aslot: u64,
    /// Rolling bitmap of the last 128 slots; bit 0 is the head slot.
    pub recent_slots_filled: u128,
    /// Set while the block that triggered maintenance is being applied.
    pub maintenance_flag: bool,
}

/// Closed sum over every storable record type. The undo log captures
/// these, so adding a table means adding a variant here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnyObject {
    Account(AccountObject),
    Asset(AssetObject),
    Witness(WitnessObject),
    LimitOrder(LimitOrderObject),
    Proposal(ProposalObject),
    WithdrawPermission(WithdrawPermissionObject),
    Transaction(TransactionObject),
    BlockSummary(BlockSummaryObject),
    GlobalProperty(GlobalPropertyObject),
    DynamicGlobalProperty(DynamicGlobalPropertyObject),
}

impl AnyObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            AnyObject::Account(_) => ObjectType::Account,
            AnyObject::Asset(_) => ObjectType::Asset,
            AnyObject::Witness(_) => ObjectType::Witness,
            AnyObject::LimitOrder(_) => ObjectType::LimitOrder,
            AnyObject::Proposal(_) => ObjectType::Proposal,
            AnyObject::WithdrawPermission(_) => ObjectType::WithdrawPermission,
            AnyObject::Transaction(_) => ObjectType::Transaction,
            AnyObject::BlockSummary(_) => ObjectType::BlockSummary,
            AnyObject::GlobalProperty(_) => ObjectType::GlobalProperty,
            AnyObject::DynamicGlobalProperty(_) => ObjectType::DynamicGlobalProperty,
        }
    }

    pub fn instance(&self) -> u64 {
        match self {
            AnyObject::Account(o) => o.id.0,
            AnyObject::Asset(o) => o.id.0,
            AnyObject::Witness(o) => o.id.0,
            AnyObject::LimitOrder(o) => o.id.0,
            AnyObject::Proposal(o) => o.id.0,
            AnyObject::WithdrawPermission(o) => o.id.0,
            AnyObject::Transaction(o) => o.instance,
            AnyObject::BlockSummary(o) => o.instance,
            AnyObject::GlobalProperty(_) => 0,
            AnyObject::DynamicGlobalProperty(_) => 0,
        }
    }

    pub fn object_id(&self) -> ObjectId {
        ObjectId::new(self.object_type(), self.instance())
    }
}
