//! Weighted threshold authorities.
//!
//! An authority is satisfied when the weights of its satisfied entries
//! reach `weight_threshold`. Key entries are satisfied by a verified
//! signature from that key; account entries are satisfied by recursively
//! satisfying that account's own authority, down to a bounded depth.
//! Accounts reference authorities which reference accounts; the recursion
//! resolves references through the caller-supplied lookup, so the data
//! itself stays acyclic at the language level.

use lib_crypto::PublicKey;
use lib_types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which of an account's two authorities an operation demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthorityLevel {
    /// Day-to-day operations.
    Active,
    /// Key rotation and other account-structure changes.
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub weight_threshold: u32,
    pub account_auths: BTreeMap<AccountId, u16>,
    pub key_auths: BTreeMap<PublicKey, u16>,
}

impl Authority {
    /// Single-key authority with threshold 1.
    pub fn single_key(key: PublicKey) -> Self {
        let mut key_auths = BTreeMap::new();
        key_auths.insert(key, 1);
        Self { weight_threshold: 1, account_auths: BTreeMap::new(), key_auths }
    }

    /// An authority nothing can ever satisfy. Used to freeze an account.
    pub fn impossible() -> Self {
        Self { weight_threshold: 1, account_auths: BTreeMap::new(), key_auths: BTreeMap::new() }
    }

    pub fn is_impossible(&self) -> bool {
        let max: u64 = self
            .account_auths
            .values()
            .chain(self.key_auths.values())
            .map(|w| *w as u64)
            .sum();
        max < self.weight_threshold as u64
    }

    /// Structural sanity: a zero threshold would make every transaction
    /// authorised for this account.
    pub fn validate(&self) -> bool {
        self.weight_threshold > 0
    }
}

/// Walk `authority`, accumulating weight from `signed_keys` and from
/// recursively satisfied account entries, until the threshold is met or
/// the tree is exhausted. `max_depth` bounds recursion into account
/// entries; entries past the bound contribute nothing.
pub fn authority_satisfied<'a>(
    authority: &Authority,
    signed_keys: &[PublicKey],
    lookup: &impl Fn(AccountId) -> Option<&'a Authority>,
    max_depth: u8,
) -> bool {
    let mut total: u64 = 0;
    let threshold = authority.weight_threshold as u64;

    for (key, weight) in &authority.key_auths {
        if signed_keys.contains(key) {
            total += *weight as u64;
            if total >= threshold {
                return true;
            }
        }
    }

    for (account, weight) in &authority.account_auths {
        if max_depth == 0 {
            break;
        }
        if let Some(inner) = lookup(*account) {
            if authority_satisfied(inner, signed_keys, lookup, max_depth - 1) {
                total += *weight as u64;
                if total >= threshold {
                    return true;
                }
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey([byte; 32])
    }

    fn multi(threshold: u32, keys: &[(u8, u16)]) -> Authority {
        let mut key_auths = BTreeMap::new();
        for (b, w) in keys {
            key_auths.insert(key(*b), *w);
        }
        Authority { weight_threshold: threshold, account_auths: BTreeMap::new(), key_auths }
    }

    #[test]
    fn single_key_threshold() {
        let auth = Authority::single_key(key(1));
        let none: fn(AccountId) -> Option<&'static Authority> = |_| None;
        assert!(authority_satisfied(&auth, &[key(1)], &none, 2));
        assert!(!authority_satisfied(&auth, &[key(2)], &none, 2));
    }

    #[test]
    fn weights_accumulate_to_threshold() {
        let auth = multi(3, &[(1, 1), (2, 1), (3, 1)]);
        let none: fn(AccountId) -> Option<&'static Authority> = |_| None;
        assert!(!authority_satisfied(&auth, &[key(1), key(2)], &none, 2));
        assert!(authority_satisfied(&auth, &[key(1), key(2), key(3)], &none, 2));
    }

    #[test]
    fn nested_account_authority_bounded_by_depth() {
        let inner = Authority::single_key(key(9));
        let mut account_auths = BTreeMap::new();
        account_auths.insert(AccountId(5), 1u16);
        let outer =
            Authority { weight_threshold: 1, account_auths, key_auths: BTreeMap::new() };

        let lookup = |id: AccountId| if id == AccountId(5) { Some(&inner) } else { None };
        assert!(authority_satisfied(&outer, &[key(9)], &lookup, 1));
        // depth 0 refuses to recurse
        assert!(!authority_satisfied(&outer, &[key(9)], &lookup, 0));
    }

    #[test]
    fn impossible_authority() {
        assert!(Authority::impossible().is_impossible());
        assert!(!Authority::single_key(key(1)).is_impossible());
    }
}
