//! Read-only accessors: head state, slot arithmetic, block lookups, and
//! the market queries the data feed publishes from.

use crate::database::Database;
use crate::error::{ChainError, ChainResult};
use crate::object::{AssetObject, DynamicGlobalPropertyObject, GlobalPropertyObject, LimitOrderObject};
use crate::protocol::SignedBlock;
use crate::serial;
use lib_types::{Amount, AssetId, BlockId, TimePointSec, WitnessId};

/// One aggregated side-entry of an order book snapshot. The float price is
/// for display and the UDP feed only; consensus never touches it.
#[derive(Debug, Clone, PartialEq)]
pub struct BookOrder {
    pub price: f64,
    pub base: Amount,
    pub quote: Amount,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderBook {
    pub base: String,
    pub quote: String,
    pub bids: Vec<BookOrder>,
    pub asks: Vec<BookOrder>,
}

impl Database {
    // ------------------------------------------------------------------
    // head state
    // ------------------------------------------------------------------

    pub fn global_properties(&self) -> &GlobalPropertyObject {
        self.objects.global_properties()
    }

    pub fn dynamic_properties(&self) -> &DynamicGlobalPropertyObject {
        self.objects.dynamic_properties()
    }

    pub fn head_block_id(&self) -> BlockId {
        self.objects.dynamic_properties().head_block_id
    }

    pub fn head_block_num(&self) -> u32 {
        self.objects.dynamic_properties().head_block_number
    }

    pub fn head_block_time(&self) -> TimePointSec {
        self.objects.dynamic_properties().time
    }

    pub fn last_irreversible_block_num(&self) -> u32 {
        self.objects.dynamic_properties().last_irreversible_block_num
    }

    // ------------------------------------------------------------------
    // slots and the production schedule
    // ------------------------------------------------------------------

    /// Start time of a future slot. Slot 0 is "before genesis" and has no
    /// time; slot 1 is the first block production opportunity after head.
    pub fn get_slot_time(&self, slot_num: u32) -> TimePointSec {
        if slot_num == 0 {
            return TimePointSec::zero();
        }
        let interval = self.objects.global_properties().parameters.block_interval;
        let dynamic = self.objects.dynamic_properties();
        if dynamic.head_block_number == 0 {
            // before block 1, any slot counts from genesis time
            return dynamic.time + slot_num * interval;
        }
        let head_slot_start = TimePointSec::new((dynamic.time.secs() / interval) * interval);
        head_slot_start + slot_num * interval
    }

    /// Which future slot `when` falls into; 0 when it is not past the head
    /// slot.
    pub fn get_slot_at_time(&self, when: TimePointSec) -> u32 {
        let first_slot_time = self.get_slot_time(1);
        if when < first_slot_time {
            return 0;
        }
        let interval = self.objects.global_properties().parameters.block_interval;
        (when.secs() - first_slot_time.secs()) / interval + 1
    }

    /// The witness scheduled to sign at the given future slot; a pure
    /// function of the shuffled schedule and the head absolute slot.
    pub fn get_scheduled_witness(&self, slot_num: u32) -> ChainResult<WitnessId> {
        let dynamic = self.objects.dynamic_properties();
        let schedule = &self.objects.global_properties().current_shuffled_witnesses;
        if schedule.is_empty() {
            return Err(ChainError::internal("witness schedule is empty"));
        }
        let absolute_slot = dynamic.current_aslot + slot_num as u64;
        Ok(schedule[(absolute_slot % schedule.len() as u64) as usize])
    }

    // ------------------------------------------------------------------
    // block lookups
    // ------------------------------------------------------------------

    pub fn fetch_block_by_id(&self, id: &BlockId) -> ChainResult<Option<SignedBlock>> {
        if let Some(item) = self.fork_db.fetch_block(id) {
            return Ok(Some(item.block.clone()));
        }
        match self.block_store.fetch_optional(id)? {
            Some(bytes) => Ok(Some(serial::from_canonical_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn fetch_block_by_number(&self, num: u32) -> ChainResult<Option<SignedBlock>> {
        let in_fork = self.fork_db.fetch_block_by_number(num);
        if in_fork.len() == 1 {
            return Ok(Some(in_fork[0].block.clone()));
        }
        match self.block_store.fetch_by_number(num)? {
            Some(bytes) => Ok(Some(serial::from_canonical_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_block_id_for_num(&self, num: u32) -> ChainResult<BlockId> {
        Ok(self.block_store.fetch_block_id(num)?)
    }

    // ------------------------------------------------------------------
    // asset and market queries
    // ------------------------------------------------------------------

    pub fn lookup_asset_symbols(&self, symbols: &[&str]) -> Vec<Option<AssetObject>> {
        symbols
            .iter()
            .map(|symbol| {
                self.objects
                    .find_asset_by_symbol(symbol)
                    .and_then(|id| self.objects.find_asset(id))
                    .cloned()
            })
            .collect()
    }

    /// Open orders on both sides of a market, best prices first per side.
    pub fn get_limit_orders(
        &self,
        a: AssetId,
        b: AssetId,
        limit: u32,
    ) -> ChainResult<Vec<LimitOrderObject>> {
        if limit > 300 {
            return Err(ChainError::structural("order query limit exceeds 300"));
        }
        let mut result = Vec::with_capacity(limit as usize * 2);
        for id in self.objects.orders_in_market(a, b).take(limit as usize) {
            result.push(self.objects.get_limit_order(id)?.clone());
        }
        for id in self.objects.orders_in_market(b, a).take(limit as usize) {
            result.push(self.objects.get_limit_order(id)?.clone());
        }
        Ok(result)
    }

    /// Aggregated top-of-book snapshot for display feeds.
    pub fn get_order_book(
        &self,
        base: AssetId,
        quote: AssetId,
        depth: u32,
    ) -> ChainResult<OrderBook> {
        let base_asset = self.objects.get_asset(base)?;
        let quote_asset = self.objects.get_asset(quote)?;
        let mut book = OrderBook {
            base: base_asset.symbol.clone(),
            quote: quote_asset.symbol.clone(),
            ..Default::default()
        };

        for order in self.get_limit_orders(base, quote, depth)? {
            let price = scaled_price(&order, base_asset, quote_asset);
            if order.sell_price.base.asset_id == base {
                book.bids.push(BookOrder {
                    price,
                    base: order.for_sale,
                    quote: order.amount_to_receive().amount,
                });
            } else {
                book.asks.push(BookOrder {
                    price,
                    base: order.amount_to_receive().amount,
                    quote: order.for_sale,
                });
            }
        }
        Ok(book)
    }
}

fn scaled_price(order: &LimitOrderObject, base: &AssetObject, quote: &AssetObject) -> f64 {
    let price = if order.sell_price.base.asset_id == base.id {
        order.sell_price
    } else {
        order.sell_price.invert()
    };
    if price.base.amount == 0 || price.quote.amount == 0 {
        return 0.0;
    }
    (price.base.amount as f64 * 10f64.powi(base.precision as i32))
        / (price.quote.amount as f64 * 10f64.powi(quote.precision as i32))
}
