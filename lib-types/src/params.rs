//! Chain parameters and genesis description.
//!
//! Both structures are plain serde data so a genesis file can be reviewed,
//! diffed, and loaded from JSON. Key material appears as raw 32-byte Ed25519
//! public keys; nothing in this crate interprets them.

use crate::time::TimePointSec;
use serde::{Deserialize, Serialize};

/// Consensus-critical tunables. Changing any of these mid-chain requires a
/// coordinated update at a maintenance boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParameters {
    /// Seconds between production slots.
    pub block_interval: u32,
    /// Seconds between chain maintenance runs (vote tally, schedule rebuild).
    pub maintenance_interval: u32,
    /// Hard cap on the canonical byte size of a block.
    pub maximum_block_size: u32,
    /// A transaction may not set its expiration further than this many
    /// seconds past the head block time.
    pub maximum_time_until_expiration: u32,
    /// Depth bound when walking nested account authorities.
    pub max_authority_depth: u8,
    /// Upper bound on the number of active witnesses.
    pub maximum_witness_count: u16,
    /// A published feed older than this many seconds no longer counts.
    pub maximum_feed_age: u32,
}

impl Default for ChainParameters {
    fn default() -> Self {
        Self {
            block_interval: 5,
            maintenance_interval: 86_400,
            maximum_block_size: 2 * 1024 * 1024,
            maximum_time_until_expiration: 86_400,
            max_authority_depth: 2,
            maximum_witness_count: 21,
            maximum_feed_age: 24 * 60 * 60,
        }
    }
}

impl ChainParameters {
    /// Small limits so unit tests can hit boundaries cheaply.
    pub fn for_testing() -> Self {
        Self {
            block_interval: 5,
            maintenance_interval: 3_600,
            maximum_block_size: 64 * 1024,
            maximum_time_until_expiration: 600,
            max_authority_depth: 2,
            maximum_witness_count: 7,
            maximum_feed_age: 3_600,
        }
    }
}

/// One account seeded at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub name: String,
    /// Ed25519 public key installed as both owner and active authority.
    pub key: [u8; 32],
    /// Opening balance in the core asset.
    pub core_balance: i64,
}

/// One asset seeded at genesis (beyond the built-in core asset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAsset {
    pub symbol: String,
    pub precision: u8,
    /// Index into `initial_accounts` of the issuing account.
    pub issuer: usize,
}

/// One block producer seeded at genesis. All genesis witnesses start active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisWitness {
    /// Index into `initial_accounts` of the controlling account.
    pub account: usize,
    /// Ed25519 public key blocks from this witness must be signed with.
    pub signing_key: [u8; 32],
}

/// Everything needed to deterministically construct block-0 state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
    pub initial_timestamp: TimePointSec,
    pub initial_parameters: ChainParameters,
    pub initial_accounts: Vec<GenesisAccount>,
    pub initial_assets: Vec<GenesisAsset>,
    pub initial_witnesses: Vec<GenesisWitness>,
}

impl GenesisState {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error>
    where
        Self: Sized,
    {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_are_sane() {
        let p = ChainParameters::default();
        assert!(p.block_interval > 0);
        assert!(p.maintenance_interval % p.block_interval == 0);
        assert!(p.maximum_witness_count > 0);
    }

    #[test]
    fn genesis_round_trips_through_json() {
        let genesis = GenesisState {
            initial_timestamp: TimePointSec::new(1_600_000_000),
            initial_parameters: ChainParameters::for_testing(),
            initial_accounts: vec![GenesisAccount {
                name: "init0".into(),
                key: [7u8; 32],
                core_balance: 1_000_000,
            }],
            initial_assets: vec![],
            initial_witnesses: vec![GenesisWitness { account: 0, signing_key: [7u8; 32] }],
        };
        let json = serde_json::to_string(&genesis).unwrap();
        assert_eq!(GenesisState::from_json(&json).unwrap(), genesis);
    }
}
