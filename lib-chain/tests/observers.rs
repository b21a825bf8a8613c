//! Observer contract: notification ordering and payloads.

mod common;

use common::TestChain;
use lib_chain::observer::AppliedOperation;
use lib_chain::skip::SKIP_NOTHING;
use lib_chain::{ChainObserver, Database, Operation, SignedBlock, SignedTransaction};
use lib_types::ObjectId;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl ChainObserver for RecordingObserver {
    fn applied_block(
        &self,
        _db: &Database,
        block: &SignedBlock,
        applied_ops: &[Option<AppliedOperation>],
    ) {
        let fills = applied_ops
            .iter()
            .flatten()
            .filter(|entry| matches!(entry.op, Operation::FillOrder(_)))
            .count();
        self.events
            .lock()
            .unwrap()
            .push(format!("applied:{}:{}:{fills}", block.block_num(), block.transactions.len()));
    }

    fn changed_objects(&self, _db: &Database, changed: &[ObjectId], removed: &[ObjectId]) {
        self.events
            .lock()
            .unwrap()
            .push(format!("changed:{}:{}", changed.len(), removed.len()));
    }

    fn pending_transaction(&self, _db: &Database, _trx: &SignedTransaction) {
        self.events.lock().unwrap().push("pending".into());
    }
}

#[test]
fn notifications_fire_in_lifecycle_order() {
    let mut chain = TestChain::standard();
    let observer = Arc::new(RecordingObserver::default());
    chain.db.add_observer(observer.clone());

    chain.produce_block();
    let trx = chain.transfer_trx("alice", "bob", 10);
    chain.db.push_transaction(trx, SKIP_NOTHING).unwrap();
    chain.produce_block();

    let events = observer.events.lock().unwrap().clone();
    // block 1 (empty), the pending push, then block 2 with one transaction
    assert_eq!(events[0], "applied:1:0:0");
    assert!(events[1].starts_with("changed:"));
    assert_eq!(events[2], "pending");
    assert_eq!(events[3], "applied:2:1:0");
    assert!(events[4].starts_with("changed:"));
}

#[test]
fn changed_objects_aggregates_the_whole_block() {
    let mut chain = TestChain::standard();
    let observer = Arc::new(RecordingObserver::default());
    chain.db.add_observer(observer.clone());

    chain.produce_block();
    let events = observer.events.lock().unwrap().clone();
    let changed = events
        .iter()
        .find(|event| event.starts_with("changed:"))
        .expect("changed_objects must fire");
    // at minimum the dynamic properties and the witness record moved
    let count: usize = changed.split(':').nth(1).unwrap().parse().unwrap();
    assert!(count >= 2, "expected several touched objects, saw {count}");
}

#[test]
fn failed_pushes_emit_no_pending_notification() {
    let mut chain = TestChain::standard();
    let observer = Arc::new(RecordingObserver::default());
    chain.db.add_observer(observer.clone());
    chain.produce_block();

    let overdraft = chain.transfer_trx("bob", "alice", 10_000);
    assert!(chain.db.push_transaction(overdraft, SKIP_NOTHING).is_err());

    let events = observer.events.lock().unwrap().clone();
    assert!(!events.contains(&"pending".to_string()));
}
