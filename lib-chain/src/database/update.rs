//! Per-block state bookkeeping: dynamic properties, missed blocks,
//! irreversibility, expiry sweeps, feeds, withdraw-permission periods.

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::evaluator::cancel_limit_order;
use crate::object::AnyObject;
use crate::protocol::SignedBlock;
use lib_types::{AssetId, ObjectId, ObjectType, WitnessId};
use tracing::debug;

impl Database {
    /// Charge every witness whose slot between the head block and this one
    /// went unfilled. Returns the number of missed slots.
    pub(crate) fn update_witness_missed_blocks(&mut self, block: &SignedBlock) -> ChainResult<u32> {
        let slot = self.get_slot_at_time(block.timestamp);
        if slot == 0 {
            return Err(ChainError::internal("applied block sits before the first slot"));
        }
        for missed_slot in 1..slot {
            let witness = self.get_scheduled_witness(missed_slot)?;
            if witness != block.witness {
                self.objects.modify_witness(witness, |w| w.total_missed += 1)?;
            }
        }
        Ok(slot - 1)
    }

    pub(crate) fn update_global_dynamic_data(
        &mut self,
        block: &SignedBlock,
        missed: u32,
    ) -> ChainResult<()> {
        let block_id = block.id();
        self.objects.modify_dynamic(|d| {
            d.head_block_number = block.block_num();
            d.head_block_id = block_id;
            d.time = block.timestamp;
            d.current_witness = block.witness;
            d.current_aslot += missed as u64 + 1;
            d.recent_slots_filled = if missed >= 127 {
                1
            } else {
                (d.recent_slots_filled << (missed + 1)) | 1
            };
        })
    }

    pub(crate) fn update_signing_witness(
        &mut self,
        witness: WitnessId,
        block: &SignedBlock,
    ) -> ChainResult<()> {
        let block_num = block.block_num();
        self.objects.modify_witness(witness, |w| {
            w.last_confirmed_block_num = block_num;
        })
    }

    /// A block is irreversible once two thirds of the active witnesses have
    /// confirmed a block at or past it: take the (n-1)/3 quantile of their
    /// last-confirmed numbers.
    pub(crate) fn update_last_irreversible_block(&mut self) -> ChainResult<()> {
        let active = self.objects.global_properties().active_witnesses.clone();
        if active.is_empty() {
            return Err(ChainError::internal("no active witnesses"));
        }
        let mut confirmed: Vec<u32> = active
            .iter()
            .filter_map(|id| self.objects.find_witness(*id))
            .map(|w| w.last_confirmed_block_num)
            .collect();
        if confirmed.is_empty() {
            return Err(ChainError::internal("active witness set has no witness objects"));
        }
        confirmed.sort_unstable();
        let new_irreversible = confirmed[(confirmed.len() - 1) / 3];

        if new_irreversible > self.objects.dynamic_properties().last_irreversible_block_num {
            self.objects.modify_dynamic(|d| {
                d.last_irreversible_block_num = new_irreversible;
            })?;
            // no fork switch may cross this boundary; forget older items
            self.fork_db.prune_below(new_irreversible);
        }
        Ok(())
    }

    pub(crate) fn clear_expired_transactions(&mut self) -> ChainResult<()> {
        let now = self.head_block_time();
        for instance in self.objects.expired_transactions(now) {
            self.objects.remove(ObjectId::new(ObjectType::Transaction, instance))?;
        }
        Ok(())
    }

    pub(crate) fn clear_expired_proposals(&mut self) -> ChainResult<()> {
        let now = self.head_block_time();
        for id in self.objects.expired_proposals(now) {
            debug!(proposal = %id, "proposal expired unapproved");
            self.objects.remove(id.object_id())?;
        }
        Ok(())
    }

    /// Cancel every order whose expiration has passed, refunding the
    /// escrowed remainder.
    pub(crate) fn clear_expired_orders(&mut self) -> ChainResult<()> {
        let now = self.head_block_time();
        for id in self.objects.expired_orders(now) {
            debug!(order = %id, "limit order expired");
            cancel_limit_order(self, id)?;
        }
        Ok(())
    }

    /// Drop feeds past their maximum age; assets whose feed set changed get
    /// their core exchange rate refreshed here too.
    pub(crate) fn update_expired_feeds(&mut self) -> ChainResult<()> {
        let now = self.head_block_time();
        let max_age = self.objects.global_properties().parameters.maximum_feed_age;

        let stale: Vec<AssetId> = self
            .objects
            .range(ObjectType::Asset)
            .filter_map(|obj| match obj {
                AnyObject::Asset(a)
                    if a.feeds.values().any(|f| now.saturating_sub(f.published) > max_age) =>
                {
                    Some(a.id)
                }
                _ => None,
            })
            .collect();

        for id in stale {
            self.objects.modify_asset(id, |asset| {
                asset.feeds.retain(|_, f| now.saturating_sub(f.published) <= max_age);
            })?;
            if let Some(median) =
                self.objects.get_asset(id)?.median_feed(now, max_age)
            {
                self.objects.modify_asset(id, |asset| asset.core_exchange_rate = median)?;
            }
        }
        Ok(())
    }

    /// Refresh the remaining core exchange rates from live median feeds.
    pub(crate) fn update_core_exchange_rates(&mut self) -> ChainResult<()> {
        let now = self.head_block_time();
        let max_age = self.objects.global_properties().parameters.maximum_feed_age;

        let with_feeds: Vec<AssetId> = self
            .objects
            .range(ObjectType::Asset)
            .filter_map(|obj| match obj {
                AnyObject::Asset(a) if a.id != AssetId::CORE && !a.feeds.is_empty() => Some(a.id),
                _ => None,
            })
            .collect();

        for id in with_feeds {
            if let Some(median) = self.objects.get_asset(id)?.median_feed(now, max_age) {
                if self.objects.get_asset(id)?.core_exchange_rate != median {
                    self.objects.modify_asset(id, |asset| asset.core_exchange_rate = median)?;
                }
            }
        }
        Ok(())
    }

    /// Roll withdraw permissions into their current period and drop the
    /// fully expired ones.
    pub(crate) fn update_withdraw_permissions(&mut self) -> ChainResult<()> {
        let now = self.head_block_time();
        for id in self.objects.expired_withdraw_permissions(now) {
            self.objects.remove(id.object_id())?;
        }

        let needs_rollover: Vec<_> = self
            .objects
            .range(ObjectType::WithdrawPermission)
            .filter_map(|obj| match obj {
                AnyObject::WithdrawPermission(w) if w.current_period_end() <= now => Some(w.id),
                _ => None,
            })
            .collect();
        for id in needs_rollover {
            self.objects.modify_withdraw_permission(id, |w| {
                let elapsed = now.saturating_sub(w.period_start_time) / w.withdrawal_period_sec;
                w.period_start_time = w.period_start_time + elapsed * w.withdrawal_period_sec;
                w.claimed_this_period = 0;
            })?;
        }
        Ok(())
    }

    pub(crate) fn update_maintenance_flag(&mut self, maintenance_performed: bool) -> ChainResult<()> {
        self.objects.modify_dynamic(|d| d.maintenance_flag = maintenance_performed)
    }

    /// Reshuffle the production order at every round boundary. A pure
    /// function of the property objects: the permutation is seeded from the
    /// head block id.
    pub(crate) fn update_witness_schedule(&mut self) -> ChainResult<()> {
        let dynamic = self.objects.dynamic_properties();
        let active = self.objects.global_properties().active_witnesses.clone();
        if active.is_empty() {
            return Err(ChainError::internal("no active witnesses to schedule"));
        }
        if dynamic.head_block_number % active.len() as u32 != 0 {
            return Ok(());
        }

        let mut seed = u64::from_le_bytes(
            dynamic.head_block_id.0[4..12].try_into().expect("block ids are 20 bytes"),
        ) ^ dynamic.head_block_number as u64;

        let mut shuffled = active;
        for i in (1..shuffled.len()).rev() {
            seed = xorshift64(seed);
            let j = (seed % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }
        self.objects.modify_global(|g| g.current_shuffled_witnesses = shuffled)
    }
}

fn xorshift64(mut x: u64) -> u64 {
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    // keep a zero seed from locking the generator
    if x == 0 {
        0x9E37_79B9_7F4A_7C15
    } else {
        x
    }
}
