//! Chain maintenance: vote tally and active-set rotation.
//!
//! Runs when a block's timestamp crosses the scheduled maintenance time.
//! Everything here is a deterministic function of chain state; wall-clock
//! input would fork the network.

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::object::AnyObject;
use crate::protocol::SignedBlock;
use lib_types::{Amount, AssetId, ObjectType, WitnessId};
use std::collections::BTreeMap;
use tracing::info;

impl Database {
    pub(crate) fn perform_chain_maintenance(&mut self, block: &SignedBlock) -> ChainResult<()> {
        self.tally_witness_votes()?;
        self.rotate_active_witnesses()?;

        let interval = self.objects.global_properties().parameters.maintenance_interval;
        let block_time = block.timestamp;
        self.objects.modify_dynamic(|d| {
            while d.next_maintenance_time <= block_time {
                d.next_maintenance_time = d.next_maintenance_time + interval;
            }
        })?;
        info!(
            head = self.head_block_num(),
            next = %self.objects.dynamic_properties().next_maintenance_time,
            "chain maintenance performed"
        );
        Ok(())
    }

    /// Stake-weighted witness votes: every account's core balance counts
    /// once toward each witness it votes for.
    fn tally_witness_votes(&mut self) -> ChainResult<()> {
        let mut tally: BTreeMap<WitnessId, Amount> = self
            .objects
            .range(ObjectType::Witness)
            .filter_map(|obj| match obj {
                AnyObject::Witness(w) => Some((w.id, 0)),
                _ => None,
            })
            .collect();

        for obj in self.objects.range(ObjectType::Account) {
            let AnyObject::Account(account) = obj else { continue };
            let stake = account.balance(AssetId::CORE);
            if stake <= 0 {
                continue;
            }
            for witness in &account.votes {
                if let Some(total) = tally.get_mut(witness) {
                    *total += stake;
                }
            }
        }

        for (witness, votes) in tally {
            self.objects.modify_witness(witness, |w| w.vote_count = votes)?;
        }
        Ok(())
    }

    /// The top witnesses by (votes, id) become the active set, capped by
    /// the chain parameter. Ties resolve toward older registrations so the
    /// outcome is total.
    fn rotate_active_witnesses(&mut self) -> ChainResult<()> {
        let maximum = self.objects.global_properties().parameters.maximum_witness_count as usize;

        let mut ranked: Vec<(Amount, WitnessId)> = self
            .objects
            .range(ObjectType::Witness)
            .filter_map(|obj| match obj {
                AnyObject::Witness(w) => Some((w.vote_count, w.id)),
                _ => None,
            })
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let active: Vec<WitnessId> =
            ranked.into_iter().take(maximum.max(1)).map(|(_, id)| id).collect();
        if active.is_empty() {
            return Err(ChainError::internal("maintenance found no witnesses at all"));
        }

        self.objects.modify_global(|g| {
            g.active_witnesses = active.clone();
            // the shuffle catches up at the next round boundary; until then
            // production continues on the previous order
            g.current_shuffled_witnesses
                .retain(|witness| active.contains(witness));
            if g.current_shuffled_witnesses.is_empty() {
                g.current_shuffled_witnesses = active;
            }
        })
    }
}
