//! The versioned object store.
//!
//! Live chain state is an arena of typed records addressed by 64-bit
//! instance ids; all cross references go through the store, and every
//! mutation inside an undo session records a reversible delta.

pub mod objects;
pub mod store;

pub use objects::{
    AccountObject, AnyObject, AssetObject, BlockSummaryObject, DynamicGlobalPropertyObject,
    FeedEntry, GlobalPropertyObject, LimitOrderObject, ProposalObject, TransactionObject,
    WithdrawPermissionObject, WitnessObject,
};
pub use store::{ObjectStore, OrderBookKey, UndoSession};
