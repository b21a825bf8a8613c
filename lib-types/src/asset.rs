//! Amounts and prices.
//!
//! A [`Price`] is the exact rational `base / quote`. Comparisons are done by
//! 128-bit cross multiplication so two peers never disagree on order-book
//! ordering the way floating point would let them.

use crate::ids::AssetId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Signed token quantity in an asset's smallest unit.
pub type Amount = i64;

/// A quantity of a specific asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AssetAmount {
    pub amount: Amount,
    pub asset_id: AssetId,
}

impl AssetAmount {
    pub const fn new(amount: Amount, asset_id: AssetId) -> Self {
        Self { amount, asset_id }
    }

    pub const fn core(amount: Amount) -> Self {
        Self { amount, asset_id: AssetId::CORE }
    }
}

impl fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.amount, self.asset_id)
    }
}

/// Exchange rate expressed as the rational `base / quote`.
///
/// For a limit order, `base` is what the seller gives and `quote` what they
/// demand; a higher price therefore means a more generous offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Price {
    pub base: AssetAmount,
    pub quote: AssetAmount,
}

impl Price {
    pub const fn new(base: AssetAmount, quote: AssetAmount) -> Self {
        Self { base, quote }
    }

    /// Swap numerator and denominator, viewing the rate from the other side
    /// of the market.
    pub fn invert(self) -> Price {
        Price { base: self.quote, quote: self.base }
    }

    /// Market key `(base asset, quote asset)` for this rate.
    pub fn market(&self) -> (AssetId, AssetId) {
        (self.base.asset_id, self.quote.asset_id)
    }

    pub fn is_well_formed(&self) -> bool {
        self.base.amount > 0 && self.quote.amount > 0 && self.base.asset_id != self.quote.asset_id
    }

    /// Compare two rates over the same market pair by cross multiplication.
    ///
    /// Both prices must already share `base.asset_id` and `quote.asset_id`;
    /// mixing markets here is a caller bug.
    pub fn cmp_rate(&self, other: &Price) -> Ordering {
        debug_assert_eq!(self.base.asset_id, other.base.asset_id);
        debug_assert_eq!(self.quote.asset_id, other.quote.asset_id);
        let lhs = self.base.amount as i128 * other.quote.amount as i128;
        let rhs = other.base.amount as i128 * self.quote.amount as i128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
