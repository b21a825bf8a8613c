//! Shared chain fixture for integration tests.
//!
//! Every test chain is built from the same deterministic genesis recipe, so
//! two fixtures with identical arguments produce byte-identical state and
//! identical block ids, which is exactly what the fork tests lean on.

#![allow(dead_code)]

use lib_chain::protocol::operations::TransferOperation;
use lib_chain::serial;
use lib_chain::skip::SKIP_NOTHING;
use lib_chain::{Database, Operation, ProcessedTransaction, SignedBlock, SignedTransaction};
use lib_crypto::PrivateKey;
use lib_storage::MemoryBlockStore;
use lib_types::{
    AccountId, AssetAmount, AssetId, ChainParameters, GenesisAccount, GenesisState,
    GenesisWitness, ObjectType, TimePointSec, WitnessId,
};
use std::sync::Arc;

/// Genesis time; a multiple of the block interval.
pub const GENESIS_TIME: u32 = 1_600_000_000;

pub struct TestChain {
    pub db: Database,
    pub account_keys: Vec<PrivateKey>,
    pub account_names: Vec<String>,
    pub witness_key: PrivateKey,
}

impl TestChain {
    /// `accounts`: (name, core balance). The first `witness_count` accounts
    /// also register witnesses, all signing with one shared test key.
    pub fn with_genesis(
        accounts: &[(&str, i64)],
        witness_count: usize,
        parameters: ChainParameters,
    ) -> Self {
        Self::with_genesis_at(accounts, witness_count, parameters, GENESIS_TIME)
    }

    pub fn with_genesis_at(
        accounts: &[(&str, i64)],
        witness_count: usize,
        parameters: ChainParameters,
        genesis_time: u32,
    ) -> Self {
        let witness_key = PrivateKey::from_seed([200u8; 32]);
        let account_keys: Vec<PrivateKey> = (0..accounts.len())
            .map(|index| PrivateKey::from_seed([index as u8 + 1; 32]))
            .collect();

        let genesis = GenesisState {
            initial_timestamp: TimePointSec::new(genesis_time),
            initial_parameters: parameters,
            initial_accounts: accounts
                .iter()
                .zip(&account_keys)
                .map(|((name, balance), key)| GenesisAccount {
                    name: name.to_string(),
                    key: key.public_key().0,
                    core_balance: *balance,
                })
                .collect(),
            initial_assets: vec![],
            initial_witnesses: (0..witness_count.min(accounts.len()))
                .map(|account| GenesisWitness { account, signing_key: witness_key.public_key().0 })
                .collect(),
        };

        let db = Database::open(&genesis, Arc::new(MemoryBlockStore::new()))
            .expect("genesis must initialize");
        Self {
            db,
            account_keys,
            account_names: accounts.iter().map(|(name, _)| name.to_string()).collect(),
            witness_key,
        }
    }

    /// Five accounts, five witnesses: enough spread that irreversibility
    /// lags the head and fork switching stays possible.
    pub fn standard() -> Self {
        Self::with_genesis(
            &[("alice", 1_000), ("bob", 0), ("carol", 500), ("dave", 0), ("erin", 2_000)],
            5,
            ChainParameters::for_testing(),
        )
    }

    pub fn account_id(&self, name: &str) -> AccountId {
        self.db
            .objects()
            .find_account_by_name(name)
            .unwrap_or_else(|| panic!("no account named {name}"))
    }

    pub fn key_of(&self, name: &str) -> &PrivateKey {
        let index = self
            .account_names
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("no key for {name}"));
        &self.account_keys[index]
    }

    pub fn balance(&self, name: &str, asset: AssetId) -> i64 {
        let id = self.account_id(name);
        self.db.objects().get_account(id).expect("account exists").balance(asset)
    }

    pub fn core_balance(&self, name: &str) -> i64 {
        self.balance(name, AssetId::CORE)
    }

    /// A signed transaction with TaPoS bound to the current head.
    pub fn signed_trx(&self, operations: Vec<Operation>, signers: &[&str]) -> SignedTransaction {
        self.signed_trx_with_expiration(operations, self.db.head_block_time() + 120, signers)
    }

    pub fn signed_trx_with_expiration(
        &self,
        operations: Vec<Operation>,
        expiration: TimePointSec,
        signers: &[&str],
    ) -> SignedTransaction {
        let head_id = self.db.head_block_id();
        let mut trx = SignedTransaction::new(
            (self.db.head_block_num() & 0xffff) as u16,
            head_id.tapos_prefix(),
            expiration,
            operations,
        );
        for name in signers {
            trx.sign(self.key_of(name));
        }
        trx
    }

    pub fn transfer_op(&self, from: &str, to: &str, amount: i64) -> Operation {
        Operation::Transfer(TransferOperation {
            from: self.account_id(from),
            to: self.account_id(to),
            amount: AssetAmount::core(amount),
            memo: vec![],
        })
    }

    pub fn transfer_trx(&self, from: &str, to: &str, amount: i64) -> SignedTransaction {
        self.signed_trx(vec![self.transfer_op(from, to, amount)], &[from])
    }

    /// Produce a block in the next slot with the scheduled witness.
    pub fn produce_block(&mut self) -> SignedBlock {
        self.produce_at_slot(1)
    }

    pub fn produce_at_slot(&mut self, slot: u32) -> SignedBlock {
        let when = self.db.get_slot_time(slot);
        let witness = self.db.get_scheduled_witness(slot).expect("schedule is populated");
        self.db
            .generate_block(when, witness, &self.witness_key, SKIP_NOTHING)
            .expect("block production must succeed")
    }

    /// Build a correctly signed block containing `transactions` without
    /// applying it: the transactions may be ones this state would reject.
    pub fn craft_block(&self, transactions: Vec<SignedTransaction>, slot: u32) -> SignedBlock {
        let witness = self.db.get_scheduled_witness(slot).expect("schedule is populated");
        let mut block = SignedBlock {
            previous: self.db.head_block_id(),
            timestamp: self.db.get_slot_time(slot),
            witness,
            transactions: transactions
                .into_iter()
                .map(|trx| ProcessedTransaction { trx, operation_results: vec![] })
                .collect(),
            ..Default::default()
        };
        block.transaction_merkle_root = block.calculate_merkle_root();
        block.sign(&self.witness_key);
        block
    }

    /// Canonical serialisation of every live object, in deterministic
    /// order. Two states are equal exactly when their fingerprints are.
    pub fn fingerprint(&self) -> Vec<u8> {
        fingerprint(&self.db)
    }
}

pub fn fingerprint(db: &Database) -> Vec<u8> {
    fingerprint_of(db, ALL_OBJECT_TYPES)
}

/// Everything except the duplicate-detection index. Skip-flag runs omit
/// dupe bookkeeping by design, so equivalence claims compare this view.
pub fn fingerprint_without_dupe_index(db: &Database) -> Vec<u8> {
    let types: Vec<ObjectType> = ALL_OBJECT_TYPES
        .iter()
        .copied()
        .filter(|ty| *ty != ObjectType::Transaction)
        .collect();
    fingerprint_of(db, &types)
}

pub const ALL_OBJECT_TYPES: &[ObjectType] = &[
    ObjectType::Account,
    ObjectType::Asset,
    ObjectType::Witness,
    ObjectType::LimitOrder,
    ObjectType::Proposal,
    ObjectType::WithdrawPermission,
    ObjectType::Transaction,
    ObjectType::BlockSummary,
    ObjectType::GlobalProperty,
    ObjectType::DynamicGlobalProperty,
];

fn fingerprint_of(db: &Database, types: &[ObjectType]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for ty in types {
        for obj in db.objects().range(*ty) {
            bytes.extend(serial::canonical_bytes(obj));
        }
    }
    bytes
}

/// The witness id scheduled for a slot; handy when crafting rival forks.
pub fn scheduled(db: &Database, slot: u32) -> WitnessId {
    db.get_scheduled_witness(slot).expect("schedule is populated")
}
