//! Proposal lifecycle: approval-driven execution, expiry, and the
//! replay-sensitive applied-ops cleanup on failure.

mod common;

use common::TestChain;
use lib_chain::protocol::operations::{
    ProposalCreateOperation, ProposalUpdateOperation, TransferOperation,
};
use lib_chain::skip::SKIP_NOTHING;
use lib_chain::{Operation, OperationResult};
use lib_types::{AssetAmount, ChainParameters, ProposalId};
use std::collections::BTreeSet;

const ACCOUNTS: &[(&str, i64)] =
    &[("alice", 1_000), ("bob", 0), ("carol", 500), ("dave", 0), ("erin", 2_000)];

/// Create a proposal whose single inner operation is `inner`, then approve
/// it with every named account. Returns the proposal id.
fn propose_and_approve(
    chain: &mut TestChain,
    inner: Operation,
    proposer: &str,
    approvers: &[&str],
) -> ProposalId {
    let create = Operation::ProposalCreate(ProposalCreateOperation {
        proposer: chain.account_id(proposer),
        proposed_ops: vec![inner],
        expiration_time: chain.db.head_block_time() + 500,
    });
    let trx = chain.signed_trx(vec![create], &[proposer]);
    let processed = chain.db.push_transaction(trx, SKIP_NOTHING).unwrap();
    let OperationResult::Id(oid) = processed.operation_results[0] else {
        panic!("proposal creation must return an id");
    };
    let proposal = ProposalId(oid.instance);

    for approver in approvers {
        let update = Operation::ProposalUpdate(ProposalUpdateOperation {
            account: chain.account_id(approver),
            proposal,
            approvals_to_add: BTreeSet::from([chain.account_id(approver)]),
            approvals_to_remove: BTreeSet::new(),
        });
        let trx = chain.signed_trx(vec![update], &[approver]);
        chain.db.push_transaction(trx, SKIP_NOTHING).unwrap();
    }
    proposal
}

#[test]
fn proposal_executes_once_fully_approved() {
    let mut chain = TestChain::standard();
    chain.produce_block();

    let inner = Operation::Transfer(TransferOperation {
        from: chain.account_id("erin"),
        to: chain.account_id("dave"),
        amount: AssetAmount::core(300),
        memo: vec![],
    });
    // proposed by alice, but only erin's approval is required
    let proposal = propose_and_approve(&mut chain, inner, "alice", &["erin"]);

    assert_eq!(chain.core_balance("dave"), 300);
    assert!(chain.db.objects().find_proposal(proposal).is_none(), "executed proposals vanish");

    chain.produce_block();
    assert_eq!(chain.core_balance("dave"), 300);
}

#[test]
fn unapproved_proposals_expire_and_vanish() {
    let mut chain = TestChain::standard();
    chain.produce_block();

    let inner = Operation::Transfer(TransferOperation {
        from: chain.account_id("erin"),
        to: chain.account_id("dave"),
        amount: AssetAmount::core(300),
        memo: vec![],
    });
    let proposal = propose_and_approve(&mut chain, inner, "alice", &[]);
    chain.produce_block();
    assert!(chain.db.objects().find_proposal(proposal).is_some());

    // jump past the proposal expiration
    let interval = chain.db.global_properties().parameters.block_interval;
    chain.produce_at_slot(600 / interval);
    assert!(chain.db.objects().find_proposal(proposal).is_none());
    assert_eq!(chain.core_balance("dave"), 0);
}

#[test]
fn failed_proposal_truncates_applied_ops_after_the_hardfork() {
    let mut chain = TestChain::standard();
    chain.produce_block();

    // bob cannot fund this; execution will fail and leave the proposal
    let doomed = Operation::Transfer(TransferOperation {
        from: chain.account_id("bob"),
        to: chain.account_id("alice"),
        amount: AssetAmount::core(10_000),
        memo: vec![],
    });
    let proposal = propose_and_approve(&mut chain, doomed, "alice", &["bob"]);

    assert!(chain.db.objects().find_proposal(proposal).is_some(), "failed proposal is retained");
    let log = chain.db.applied_operations();
    // post-hardfork the log is resized: no tombstones, and the failed
    // inner transfer is gone entirely
    assert!(log.iter().all(|entry| entry.is_some()));
    assert!(!log
        .iter()
        .flatten()
        .any(|entry| matches!(&entry.op, Operation::Transfer(op) if op.amount.amount == 10_000)));
}

#[test]
fn failed_proposal_tombstones_applied_ops_before_the_hardfork() {
    // genesis long before the cleanup hardfork
    let mut chain =
        TestChain::with_genesis_at(ACCOUNTS, 5, ChainParameters::for_testing(), 1_400_000_000);
    chain.produce_block();

    let doomed = Operation::Transfer(TransferOperation {
        from: chain.account_id("bob"),
        to: chain.account_id("alice"),
        amount: AssetAmount::core(10_000),
        memo: vec![],
    });
    let proposal = propose_and_approve(&mut chain, doomed, "alice", &["bob"]);

    assert!(chain.db.objects().find_proposal(proposal).is_some());
    let log = chain.db.applied_operations();
    // pre-hardfork the entries are cleared in place, leaving tombstones
    assert!(log.iter().any(|entry| entry.is_none()));
}
