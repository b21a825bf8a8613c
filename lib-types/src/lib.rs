//! Meridian primitives.
//! Stable, protocol-neutral, behavior-free.

pub mod asset;
pub mod ids;
pub mod params;
pub mod time;

pub use asset::{Amount, AssetAmount, Price};
pub use ids::{
    AccountId, AssetId, BlockId, Digest, LimitOrderId, ObjectId, ObjectType, ProposalId,
    TransactionId, WithdrawPermissionId, WitnessId,
};
pub use params::{ChainParameters, GenesisAccount, GenesisAsset, GenesisState, GenesisWitness};
pub use time::TimePointSec;
