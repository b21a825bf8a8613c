//! Parallel pre-validation of blocks and transactions.
//!
//! Workers only ever touch immutable inputs (transaction and block bodies
//! they own for the duration) and write nothing but the memo cells on
//! those values. The serialising thread joins the handle before entering
//! `_apply_block`, after which the expensive checks are O(1) lookups.
//!
//! Workers are advisory: dropping a handle without joining simply means
//! the serial path recomputes everything itself.

use crate::protocol::{ProcessedTransaction, SignedBlock, SignedTransaction};
use crate::skip::{SKIP_EXPENSIVE, SKIP_TRANSACTION_DUPE_CHECK, SKIP_TRANSACTION_SIGNATURES, SKIP_WITNESS_SIGNATURE};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::thread;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct PrecomputePool {
    sender: Option<Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
    parallelism: usize,
}

impl PrecomputePool {
    /// A pool sized to the machine.
    pub fn new() -> Self {
        let parallelism = thread::available_parallelism().map(|p| p.get()).unwrap_or(2);
        Self::with_parallelism(parallelism)
    }

    pub fn with_parallelism(parallelism: usize) -> Self {
        let parallelism = parallelism.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..parallelism)
            .map(|index| {
                let receiver: Receiver<Job> = receiver.clone();
                thread::Builder::new()
                    .name(format!("precompute-{index}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("failed to spawn precompute worker")
            })
            .collect();
        Self { sender: Some(sender), workers, parallelism }
    }

    fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }

    /// Fan a block's per-transaction work out over the pool and verify the
    /// block signee alongside. With every expensive check skipped the work
    /// runs inline instead; the handle is ready either way.
    pub fn precompute_block(&self, mut block: SignedBlock, skip: u32) -> BlockPrecompute {
        let need_id = skip & SKIP_TRANSACTION_DUPE_CHECK == 0;
        let need_signatures = skip & SKIP_TRANSACTION_SIGNATURES == 0;
        let need_signee = skip & SKIP_WITNESS_SIGNATURE == 0;

        // the id only hashes the header; take it before splitting
        block.id();

        if skip & SKIP_EXPENSIVE == SKIP_EXPENSIVE || block.transactions.is_empty() {
            for tx in &block.transactions {
                tx.trx.precompute(need_id, need_signatures);
            }
            let (block_tx, block_rx) = bounded(1);
            let _ = block_tx.send(block);
            return BlockPrecompute { block_rx, chunk_rx: bounded(0).1, chunk_count: 0 };
        }

        let transactions = std::mem::take(&mut block.transactions);
        let chunk_size = transactions.len().div_ceil(self.parallelism);
        let mut chunks: Vec<Vec<ProcessedTransaction>> = Vec::new();
        let mut rest = transactions;
        while !rest.is_empty() {
            let tail = rest.split_off(chunk_size.min(rest.len()));
            chunks.push(std::mem::replace(&mut rest, tail));
        }
        let chunk_count = chunks.len();
        debug!(chunks = chunk_count, "precomputing block in parallel");

        let (chunk_tx, chunk_rx) = bounded(chunk_count);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let chunk_tx = chunk_tx.clone();
            self.spawn(move || {
                for tx in &chunk {
                    tx.trx.precompute(need_id, need_signatures);
                }
                let _ = chunk_tx.send((index, chunk));
            });
        }

        let (block_tx, block_rx) = bounded(1);
        self.spawn(move || {
            if need_signee {
                let _ = block.signee();
            }
            let _ = block_tx.send(block);
        });

        BlockPrecompute { block_rx, chunk_rx, chunk_count }
    }

    /// Background precompute for a single pending transaction; the result
    /// is consumed by the next `push_transaction` call.
    pub fn precompute_transaction(&self, trx: SignedTransaction) -> TransactionPrecompute {
        let (done_tx, done_rx) = bounded(1);
        self.spawn(move || {
            trx.precompute(true, true);
            let _ = done_tx.send(trx);
        });
        TransactionPrecompute { done_rx }
    }
}

impl Default for PrecomputePool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PrecomputePool {
    fn drop(&mut self) {
        // closing the channel lets the workers drain and exit
        self.sender = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

pub struct BlockPrecompute {
    block_rx: Receiver<SignedBlock>,
    chunk_rx: Receiver<(usize, Vec<ProcessedTransaction>)>,
    chunk_count: usize,
}

impl BlockPrecompute {
    /// Block until every worker is done and hand the memoised block back.
    /// Runs on the serialising thread, before `_apply_block`.
    pub fn join(self) -> SignedBlock {
        let mut block = self.block_rx.recv().expect("precompute worker lost the block");
        if self.chunk_count > 0 {
            let mut slots: Vec<Option<Vec<ProcessedTransaction>>> = Vec::new();
            slots.resize_with(self.chunk_count, || None);
            for _ in 0..self.chunk_count {
                let (index, chunk) =
                    self.chunk_rx.recv().expect("precompute worker lost a chunk");
                slots[index] = Some(chunk);
            }
            block.transactions = slots
                .into_iter()
                .flat_map(|slot| slot.expect("every chunk index reports once"))
                .collect();
        }
        // needs the reassembled transaction ids
        block.calculate_merkle_root();
        block
    }
}

pub struct TransactionPrecompute {
    done_rx: Receiver<SignedTransaction>,
}

impl TransactionPrecompute {
    pub fn join(self) -> SignedTransaction {
        self.done_rx.recv().expect("precompute worker lost the transaction")
    }
}
