use lotus_hashes::{Hash, ZERO_HASH};
use std::collections::HashMap;
use thiserror::Error;

use super::{CoinsMap, coin::Coin};
use crate::tx::TransactionOutpoint;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backing store read of {0} failed: {1}")]
    ReadFailed(TransactionOutpoint, String),

    #[error("backing store write failed: {0}")]
    WriteFailed(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A view over the set of unspent coins. Implemented by backing stores and by
/// [`super::CoinsViewCache`] itself, so caches can be layered.
pub trait CoinsView {
    /// Returns the coin at `outpoint` if it exists and is unspent
    fn get_coin(&self, outpoint: &TransactionOutpoint) -> StoreResult<Option<Coin>>;

    fn have_coin(&self, outpoint: &TransactionOutpoint) -> StoreResult<bool> {
        Ok(self.get_coin(outpoint)?.is_some())
    }

    /// The block this view represents the coin set of
    fn best_block(&self) -> StoreResult<Hash>;

    /// Applies the dirty entries of a child cache. Entries holding no coin are spends.
    fn batch_write(&mut self, coins: CoinsMap, best_block: Hash) -> StoreResult<()>;
}

impl<V: CoinsView + ?Sized> CoinsView for &mut V {
    fn get_coin(&self, outpoint: &TransactionOutpoint) -> StoreResult<Option<Coin>> {
        (**self).get_coin(outpoint)
    }

    fn have_coin(&self, outpoint: &TransactionOutpoint) -> StoreResult<bool> {
        (**self).have_coin(outpoint)
    }

    fn best_block(&self) -> StoreResult<Hash> {
        (**self).best_block()
    }

    fn batch_write(&mut self, coins: CoinsMap, best_block: Hash) -> StoreResult<()> {
        (**self).batch_write(coins, best_block)
    }
}

/// An in-memory coin store, the bottom of a cache hierarchy when no database is attached
#[derive(Default, Debug, Clone)]
pub struct MemoryCoinsView {
    coins: HashMap<TransactionOutpoint, Coin>,
    best_block: Hash,
}

impl MemoryCoinsView {
    pub fn new() -> Self {
        Self { coins: HashMap::new(), best_block: ZERO_HASH }
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TransactionOutpoint, &Coin)> {
        self.coins.iter()
    }
}

impl CoinsView for MemoryCoinsView {
    fn get_coin(&self, outpoint: &TransactionOutpoint) -> StoreResult<Option<Coin>> {
        Ok(self.coins.get(outpoint).cloned())
    }

    fn best_block(&self) -> StoreResult<Hash> {
        Ok(self.best_block)
    }

    fn batch_write(&mut self, coins: CoinsMap, best_block: Hash) -> StoreResult<()> {
        for (outpoint, entry) in coins {
            if !entry.is_dirty() {
                continue;
            }
            match entry.coin {
                Some(coin) => {
                    self.coins.insert(outpoint, coin);
                }
                None => {
                    self.coins.remove(&outpoint);
                }
            }
        }
        if !best_block.is_zero() {
            self.best_block = best_block;
        }
        Ok(())
    }
}
