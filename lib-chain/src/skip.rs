//! Validation skip flags.
//!
//! A bitfield threaded through every public entry point. Flags are scoped:
//! set on entry, restored on exit regardless of outcome (see
//! `Database::with_skip_flags`). Trusted replay paths (checkpointed history,
//! self-generated blocks) use them to bypass work that is already known to
//! pass.

pub const SKIP_NOTHING: u32 = 0;
pub const SKIP_WITNESS_SIGNATURE: u32 = 1 << 0;
pub const SKIP_TRANSACTION_SIGNATURES: u32 = 1 << 1;
pub const SKIP_MERKLE_CHECK: u32 = 1 << 2;
pub const SKIP_TRANSACTION_DUPE_CHECK: u32 = 1 << 3;
pub const SKIP_TAPOS_CHECK: u32 = 1 << 4;
pub const SKIP_WITNESS_SCHEDULE_CHECK: u32 = 1 << 5;
pub const SKIP_BLOCK_SIZE_CHECK: u32 = 1 << 6;

/// The checks worth parallelising or omitting on trusted input.
pub const SKIP_EXPENSIVE: u32 = SKIP_TRANSACTION_SIGNATURES
    | SKIP_WITNESS_SIGNATURE
    | SKIP_MERKLE_CHECK
    | SKIP_TRANSACTION_DUPE_CHECK;

/// Effective mask once a block is confirmed against a checkpoint.
pub const SKIP_EVERYTHING: u32 = !0;
