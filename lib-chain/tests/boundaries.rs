//! Boundary behaviour: block size, expiration windows, TaPoS, proposal
//! nesting depth, checkpoints.

mod common;

use common::TestChain;
use lib_chain::protocol::operations::{
    ProposalCreateOperation, ProposalUpdateOperation,
};
use lib_chain::serial;
use lib_chain::skip::SKIP_NOTHING;
use lib_chain::{ChainError, Operation, OperationResult};
use lib_types::{ChainParameters, ProposalId};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

const ACCOUNTS: &[(&str, i64)] =
    &[("alice", 1_000), ("bob", 0), ("carol", 500), ("dave", 0), ("erin", 2_000)];

#[test]
fn block_size_boundary_is_exact() {
    // measure the first block a fresh chain would accept
    let probe = TestChain::standard();
    let block = probe.craft_block(vec![], 1);
    let size = serial::canonical_size(&block) as u32;

    let mut exact = ChainParameters::for_testing();
    exact.maximum_block_size = size;
    let mut chain = TestChain::with_genesis(ACCOUNTS, 5, exact);
    chain.db.push_block(block.clone(), SKIP_NOTHING).unwrap();
    assert_eq!(chain.db.head_block_num(), 1, "a block exactly at the limit is accepted");

    let mut tight = ChainParameters::for_testing();
    tight.maximum_block_size = size - 1;
    let mut chain = TestChain::with_genesis(ACCOUNTS, 5, tight);
    let err = chain.db.push_block(block, SKIP_NOTHING).unwrap_err();
    assert!(matches!(err, ChainError::Structural(_)), "one byte over is rejected: {err}");
    assert_eq!(chain.db.head_block_num(), 0);
}

#[test]
fn expiration_window_boundaries() {
    let mut chain = TestChain::standard();
    chain.produce_block();
    let now = chain.db.head_block_time();
    let max_window =
        chain.db.global_properties().parameters.maximum_time_until_expiration;

    // expiration == head time: stale
    let stale = chain.signed_trx_with_expiration(
        vec![chain.transfer_op("alice", "bob", 1)],
        now,
        &["alice"],
    );
    assert!(matches!(
        chain.db.push_transaction(stale, SKIP_NOTHING).unwrap_err(),
        ChainError::Tapos(_)
    ));

    // expiration == head time + 1: the earliest acceptable moment
    let barely = chain.signed_trx_with_expiration(
        vec![chain.transfer_op("alice", "bob", 1)],
        now + 1,
        &["alice"],
    );
    chain.db.push_transaction(barely, SKIP_NOTHING).unwrap();

    // expiration beyond the window: rejected
    let distant = chain.signed_trx_with_expiration(
        vec![chain.transfer_op("alice", "bob", 1)],
        now + max_window + 1,
        &["alice"],
    );
    assert!(matches!(
        chain.db.push_transaction(distant, SKIP_NOTHING).unwrap_err(),
        ChainError::Tapos(_)
    ));
}

#[test]
fn tapos_accepts_block_zero_reference_and_rejects_wrong_fork() {
    let mut chain = TestChain::standard();

    // a transaction referencing "block 0" applied into block 1: TaPoS has
    // no history to check yet
    let trx = chain.transfer_trx("alice", "bob", 5);
    assert_eq!(trx.ref_block_num, 0);
    chain.db.push_transaction(trx, SKIP_NOTHING).unwrap();
    chain.produce_block();
    assert_eq!(chain.core_balance("bob"), 5);

    // after block 1, a transaction quoting a prefix from nowhere is bound
    // to a different fork
    let mut wrong_fork = chain.transfer_trx("alice", "bob", 5);
    wrong_fork = lib_chain::SignedTransaction::new(
        wrong_fork.ref_block_num,
        wrong_fork.ref_block_prefix ^ 0xDEAD_BEEF,
        wrong_fork.expiration,
        wrong_fork.operations,
    );
    wrong_fork.sign(chain.key_of("alice"));
    assert!(matches!(
        chain.db.push_transaction(wrong_fork, SKIP_NOTHING).unwrap_err(),
        ChainError::Tapos(_)
    ));
}

/// Build a chain of `depth` proposals, each approving the next, with a
/// transfer at the bottom, and return the transaction that triggers the
/// cascade.
fn build_nested_proposals(chain: &mut TestChain, depth: usize) -> lib_chain::SignedTransaction {
    let alice = chain.account_id("alice");
    let expiration = chain.db.head_block_time() + 500;

    let mut inner_op = chain.transfer_op("alice", "bob", 1);
    for _ in 0..depth {
        let create = Operation::ProposalCreate(ProposalCreateOperation {
            proposer: alice,
            proposed_ops: vec![inner_op],
            expiration_time: expiration,
        });
        let trx = chain.signed_trx(vec![create], &["alice"]);
        let processed = chain.db.push_transaction(trx, SKIP_NOTHING).unwrap();
        let OperationResult::Id(oid) = processed.operation_results[0] else {
            panic!("proposal creation must return an id");
        };
        inner_op = Operation::ProposalUpdate(ProposalUpdateOperation {
            account: alice,
            proposal: ProposalId(oid.instance),
            approvals_to_add: BTreeSet::from([alice]),
            approvals_to_remove: BTreeSet::new(),
        });
    }
    chain.signed_trx(vec![inner_op], &["alice"])
}

#[test]
fn proposal_nesting_at_the_limit_executes() {
    let mut chain = TestChain::standard();
    chain.produce_block();
    let limit = chain.db.global_properties().active_witnesses.len() * 2;

    let trigger = build_nested_proposals(&mut chain, limit);
    chain.db.push_transaction(trigger, SKIP_NOTHING).unwrap();
    assert_eq!(chain.core_balance("bob"), 1, "the innermost transfer executed");
}

#[test]
fn proposal_nesting_one_past_the_limit_fails() {
    let mut chain = TestChain::standard();
    chain.produce_block();
    let limit = chain.db.global_properties().active_witnesses.len() * 2;

    let trigger = build_nested_proposals(&mut chain, limit + 1);
    let err = chain.db.push_transaction(trigger, SKIP_NOTHING).unwrap_err();
    assert!(matches!(err, ChainError::ProposalNestingExceeded { .. }), "got {err}");
    assert_eq!(chain.core_balance("bob"), 0, "nothing may have executed");
}

#[test]
fn multisig_threshold_is_enforced() {
    let mut chain = TestChain::standard();
    chain.produce_block();

    // alice moves to a 2-of-2 active authority over her and erin's keys
    let mut key_auths = BTreeMap::new();
    key_auths.insert(chain.key_of("alice").public_key(), 1u16);
    key_auths.insert(chain.key_of("erin").public_key(), 1u16);
    let update = Operation::AccountUpdate(lib_chain::protocol::operations::AccountUpdateOperation {
        account: chain.account_id("alice"),
        owner: None,
        active: Some(lib_chain::Authority {
            weight_threshold: 2,
            account_auths: BTreeMap::new(),
            key_auths,
        }),
        new_votes: None,
    });
    let trx = chain.signed_trx(vec![update], &["alice"]);
    chain.db.push_transaction(trx, SKIP_NOTHING).unwrap();
    chain.produce_block();

    // one signature no longer satisfies the threshold
    let underfunded = chain.transfer_trx("alice", "bob", 10);
    assert!(matches!(
        chain.db.push_transaction(underfunded, SKIP_NOTHING).unwrap_err(),
        ChainError::Authority(_)
    ));

    // both signatures do
    let trx = chain.signed_trx(vec![chain.transfer_op("alice", "bob", 10)], &["alice", "erin"]);
    chain.db.push_transaction(trx, SKIP_NOTHING).unwrap();
    assert_eq!(chain.core_balance("bob"), 10);
}

#[test]
fn checkpoint_violation_is_fatal_and_match_skips_verification() {
    // an unsigned transfer would normally fail the authority check
    let probe = TestChain::standard();
    let mut unsigned = probe.transfer_trx("alice", "bob", 9);
    unsigned.signatures.clear();
    let block = probe.craft_block(vec![unsigned], 1);

    // checkpointed to the right id: everything is skipped, the block lands
    let mut trusting = TestChain::standard();
    trusting.db.add_checkpoints(&BTreeMap::from([(1u32, block.id())]));
    assert!(trusting.db.before_last_checkpoint());
    trusting.db.push_block(block.clone(), SKIP_NOTHING).unwrap();
    assert_eq!(trusting.core_balance("bob"), 9);
    // head is now at the checkpoint height itself
    assert!(trusting.db.before_last_checkpoint());

    // checkpointed to a different id: refusal, nothing applied
    let mut suspicious = TestChain::standard();
    let wrong = lib_types::BlockId::from_digest(&lib_types::Digest::new([7u8; 32]), 1);
    suspicious.db.add_checkpoints(&BTreeMap::from([(1u32, wrong)]));
    let err = suspicious.db.push_block(block, SKIP_NOTHING).unwrap_err();
    assert!(matches!(err, ChainError::CheckpointViolation { .. }), "got {err}");
    assert!(err.is_fatal());
    assert_eq!(suspicious.db.head_block_num(), 0);
}
