//! The closed operation set.
//!
//! Operations are a tagged variant over a frozen set of record types; the
//! tag of every variant is stable across protocol versions and doubles as
//! the index into the evaluator registry. Determinism requires the set to
//! be closed; there is deliberately no trait-object escape hatch here.

use crate::authority::{Authority, AuthorityLevel};
use crate::error::{ChainError, ChainResult};
use lib_crypto::PublicKey;
use lib_types::{
    AccountId, AssetAmount, AssetId, LimitOrderId, ObjectId, Price, ProposalId, TimePointSec,
    WithdrawPermissionId, WitnessId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of operation tags, virtual ones included.
pub const OPERATION_COUNT: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOperation {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: AssetAmount,
    pub memo: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderCreateOperation {
    pub seller: AccountId,
    pub amount_to_sell: AssetAmount,
    pub min_to_receive: AssetAmount,
    pub expiration: TimePointSec,
    /// Cancel instead of resting on the book when not fully matched.
    pub fill_or_kill: bool,
}

impl LimitOrderCreateOperation {
    pub fn sell_price(&self) -> Price {
        Price::new(self.amount_to_sell, self.min_to_receive)
    }

    /// Market pair touched by this order.
    pub fn market(&self) -> (AssetId, AssetId) {
        (self.amount_to_sell.asset_id, self.min_to_receive.asset_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderCancelOperation {
    pub account: AccountId,
    pub order: LimitOrderId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCreateOperation {
    pub registrar: AccountId,
    pub name: String,
    pub owner: Authority,
    pub active: Authority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdateOperation {
    pub account: AccountId,
    pub owner: Option<Authority>,
    pub active: Option<Authority>,
    pub new_votes: Option<BTreeSet<WitnessId>>,
}

impl AccountUpdateOperation {
    /// Rotating the owner authority demands owner-level approval.
    pub fn requires_owner_auth(&self) -> bool {
        self.owner.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessCreateOperation {
    pub witness_account: AccountId,
    pub signing_key: PublicKey,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessUpdateOperation {
    pub witness: WitnessId,
    pub witness_account: AccountId,
    pub new_signing_key: Option<PublicKey>,
    pub new_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalCreateOperation {
    pub proposer: AccountId,
    pub proposed_ops: Vec<Operation>,
    pub expiration_time: TimePointSec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalUpdateOperation {
    pub account: AccountId,
    pub proposal: ProposalId,
    pub approvals_to_add: BTreeSet<AccountId>,
    pub approvals_to_remove: BTreeSet<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDeleteOperation {
    pub account: AccountId,
    pub proposal: ProposalId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawPermissionCreateOperation {
    pub withdraw_from: AccountId,
    pub authorized: AccountId,
    pub withdrawal_limit: AssetAmount,
    pub withdrawal_period_sec: u32,
    pub periods_until_expiration: u32,
    pub period_start_time: TimePointSec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawPermissionClaimOperation {
    pub permission: WithdrawPermissionId,
    pub withdraw_from: AccountId,
    pub to: AccountId,
    pub amount: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCreateOperation {
    pub issuer: AccountId,
    pub symbol: String,
    pub precision: u8,
    /// Minted to the issuer on creation.
    pub initial_supply: i64,
    pub core_exchange_rate: Price,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPublishFeedOperation {
    pub publisher: AccountId,
    pub asset: AssetId,
    pub core_exchange_rate: Price,
}

/// Recorded when an order (partially) fills. Virtual: produced by the
/// matching engine, never valid inside a signed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillOrderOperation {
    pub order: LimitOrderId,
    pub account: AccountId,
    pub pays: AssetAmount,
    pub receives: AssetAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Transfer(TransferOperation),
    LimitOrderCreate(LimitOrderCreateOperation),
    LimitOrderCancel(LimitOrderCancelOperation),
    AccountCreate(AccountCreateOperation),
    AccountUpdate(AccountUpdateOperation),
    WitnessCreate(WitnessCreateOperation),
    WitnessUpdate(WitnessUpdateOperation),
    ProposalCreate(ProposalCreateOperation),
    ProposalUpdate(ProposalUpdateOperation),
    ProposalDelete(ProposalDeleteOperation),
    WithdrawPermissionCreate(WithdrawPermissionCreateOperation),
    WithdrawPermissionClaim(WithdrawPermissionClaimOperation),
    AssetCreate(AssetCreateOperation),
    AssetPublishFeed(AssetPublishFeedOperation),
    FillOrder(FillOrderOperation),
}

impl Operation {
    /// Stable dispatch tag.
    pub fn tag(&self) -> usize {
        match self {
            Operation::Transfer(_) => 0,
            Operation::LimitOrderCreate(_) => 1,
            Operation::LimitOrderCancel(_) => 2,
            Operation::AccountCreate(_) => 3,
            Operation::AccountUpdate(_) => 4,
            Operation::WitnessCreate(_) => 5,
            Operation::WitnessUpdate(_) => 6,
            Operation::ProposalCreate(_) => 7,
            Operation::ProposalUpdate(_) => 8,
            Operation::ProposalDelete(_) => 9,
            Operation::WithdrawPermissionCreate(_) => 10,
            Operation::WithdrawPermissionClaim(_) => 11,
            Operation::AssetCreate(_) => 12,
            Operation::AssetPublishFeed(_) => 13,
            Operation::FillOrder(_) => 14,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Operation::FillOrder(_))
    }

    /// Per-operation static checks. Nothing here touches chain state.
    pub fn validate(&self) -> ChainResult<()> {
        match self {
            Operation::Transfer(op) => {
                if op.amount.amount <= 0 {
                    return Err(ChainError::structural("transfer amount must be positive"));
                }
                if op.from == op.to {
                    return Err(ChainError::structural("transfer to self"));
                }
            }
            Operation::LimitOrderCreate(op) => {
                if !op.sell_price().is_well_formed() {
                    return Err(ChainError::structural("malformed limit order price"));
                }
            }
            Operation::LimitOrderCancel(_) => {}
            Operation::AccountCreate(op) => {
                validate_account_name(&op.name)?;
                if !op.owner.validate() || !op.active.validate() {
                    return Err(ChainError::structural("authority threshold must be positive"));
                }
            }
            Operation::AccountUpdate(op) => {
                if op.owner.is_none() && op.active.is_none() && op.new_votes.is_none() {
                    return Err(ChainError::structural("account update changes nothing"));
                }
                for auth in op.owner.iter().chain(op.active.iter()) {
                    if !auth.validate() {
                        return Err(ChainError::structural(
                            "authority threshold must be positive",
                        ));
                    }
                }
            }
            Operation::WitnessCreate(op) => {
                if op.url.len() > 256 {
                    return Err(ChainError::structural("witness url too long"));
                }
            }
            Operation::WitnessUpdate(op) => {
                if op.new_signing_key.is_none() && op.new_url.is_none() {
                    return Err(ChainError::structural("witness update changes nothing"));
                }
            }
            Operation::ProposalCreate(op) => {
                if op.proposed_ops.is_empty() {
                    return Err(ChainError::structural("proposal with no operations"));
                }
                for inner in &op.proposed_ops {
                    if inner.is_virtual() {
                        return Err(ChainError::structural(
                            "virtual operation inside a proposal",
                        ));
                    }
                    inner.validate()?;
                }
            }
            Operation::ProposalUpdate(op) => {
                if op.approvals_to_add.is_empty() && op.approvals_to_remove.is_empty() {
                    return Err(ChainError::structural("proposal update changes nothing"));
                }
                if op.approvals_to_add.intersection(&op.approvals_to_remove).next().is_some() {
                    return Err(ChainError::structural(
                        "approval both added and removed",
                    ));
                }
            }
            Operation::ProposalDelete(_) => {}
            Operation::WithdrawPermissionCreate(op) => {
                if op.withdrawal_limit.amount <= 0 {
                    return Err(ChainError::structural("withdrawal limit must be positive"));
                }
                if op.withdrawal_period_sec == 0 || op.periods_until_expiration == 0 {
                    return Err(ChainError::structural("withdrawal period must be positive"));
                }
                if op.withdraw_from == op.authorized {
                    return Err(ChainError::structural("self-authorised withdraw permission"));
                }
            }
            Operation::WithdrawPermissionClaim(op) => {
                if op.amount.amount <= 0 {
                    return Err(ChainError::structural("claim amount must be positive"));
                }
            }
            Operation::AssetCreate(op) => {
                validate_asset_symbol(&op.symbol)?;
                if op.initial_supply < 0 {
                    return Err(ChainError::structural("negative initial supply"));
                }
                if !op.core_exchange_rate.is_well_formed() {
                    return Err(ChainError::structural("malformed core exchange rate"));
                }
            }
            Operation::AssetPublishFeed(op) => {
                if !op.core_exchange_rate.is_well_formed() {
                    return Err(ChainError::structural("malformed feed price"));
                }
            }
            Operation::FillOrder(_) => {
                return Err(ChainError::structural(
                    "virtual operation in a signed transaction",
                ));
            }
        }
        Ok(())
    }

    /// Accounts whose authority must sign for this operation.
    pub fn required_authorities(&self) -> Vec<(AccountId, AuthorityLevel)> {
        use AuthorityLevel::{Active, Owner};
        match self {
            Operation::Transfer(op) => vec![(op.from, Active)],
            Operation::LimitOrderCreate(op) => vec![(op.seller, Active)],
            Operation::LimitOrderCancel(op) => vec![(op.account, Active)],
            Operation::AccountCreate(op) => vec![(op.registrar, Active)],
            Operation::AccountUpdate(op) => {
                let level = if op.requires_owner_auth() { Owner } else { Active };
                vec![(op.account, level)]
            }
            Operation::WitnessCreate(op) => vec![(op.witness_account, Active)],
            Operation::WitnessUpdate(op) => vec![(op.witness_account, Active)],
            Operation::ProposalCreate(op) => vec![(op.proposer, Active)],
            Operation::ProposalUpdate(op) => {
                let mut required = vec![(op.account, Active)];
                for added in &op.approvals_to_add {
                    required.push((*added, Active));
                }
                required
            }
            Operation::ProposalDelete(op) => vec![(op.account, Active)],
            Operation::WithdrawPermissionCreate(op) => vec![(op.withdraw_from, Active)],
            Operation::WithdrawPermissionClaim(op) => vec![(op.to, Active)],
            Operation::AssetCreate(op) => vec![(op.issuer, Active)],
            Operation::AssetPublishFeed(op) => vec![(op.publisher, Active)],
            Operation::FillOrder(_) => vec![],
        }
    }
}

/// Outcome of one evaluated operation, stored at the matching index of a
/// processed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationResult {
    Void,
    /// The object the operation created.
    Id(ObjectId),
    /// A quantity the operation settled on (e.g. amount actually withdrawn).
    Amount(AssetAmount),
}

fn validate_account_name(name: &str) -> ChainResult<()> {
    let ok = !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && name.starts_with(|c: char| c.is_ascii_lowercase());
    if ok {
        Ok(())
    } else {
        Err(ChainError::structural(format!("invalid account name {name:?}")))
    }
}

fn validate_asset_symbol(symbol: &str) -> ChainResult<()> {
    let ok = (3..=16).contains(&symbol.len())
        && symbol.chars().all(|c| c.is_ascii_uppercase() || c == '.')
        && symbol.starts_with(|c: char| c.is_ascii_uppercase());
    if ok {
        Ok(())
    } else {
        Err(ChainError::structural(format!("invalid asset symbol {symbol:?}")))
    }
}
