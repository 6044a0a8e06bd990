//! The coin set: coins, backing views and the layered write-back cache validation runs on.

pub mod coin;
pub mod coins_view;
pub mod coins_view_cache;

use std::{collections::HashMap, mem::size_of};

use crate::tx::TransactionOutpoint;

pub use coin::Coin;
pub use coins_view::{CoinsView, MemoryCoinsView, StoreError, StoreResult};
pub use coins_view_cache::CoinsViewCache;

bitflags::bitflags! {
    /// State of a cache entry relative to the view backing the cache
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CacheFlags: u8 {
        /// The entry differs from the backing view and must be written on flush
        const DIRTY = 1 << 0;
        /// The backing view does not hold an unspent version of the entry, so a spend may
        /// simply drop it
        const FRESH = 1 << 1;
    }
}

/// A cached coin. `coin` is `None` once the coin was spent in this cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinsCacheEntry {
    pub coin: Option<Coin>,
    pub flags: CacheFlags,
    /// Logical time of the last access, used to pick eviction victims
    pub last_access: u64,
}

/// Fixed bookkeeping cost of a single cache entry, added to the heap usage of its coin
pub const CACHE_ENTRY_OVERHEAD: usize = size_of::<TransactionOutpoint>() + size_of::<CoinsCacheEntry>();

impl CoinsCacheEntry {
    pub fn new(coin: Option<Coin>, flags: CacheFlags, last_access: u64) -> Self {
        Self { coin, flags, last_access }
    }

    /// An unflushed entry, as produced by a child cache
    pub fn dirty(coin: Option<Coin>) -> Self {
        Self::new(coin, CacheFlags::DIRTY, 0)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(CacheFlags::DIRTY)
    }

    pub fn is_fresh(&self) -> bool {
        self.flags.contains(CacheFlags::FRESH)
    }

    pub fn is_spent(&self) -> bool {
        self.coin.is_none()
    }

    /// Memory accounted to this entry by the cache holding it
    pub fn memory_usage(&self) -> usize {
        CACHE_ENTRY_OVERHEAD + self.coin.as_ref().map_or(0, Coin::dynamic_memory_usage)
    }
}

pub type CoinsMap = HashMap<TransactionOutpoint, CoinsCacheEntry>;
