use lotus_core::{debug, error};
use lotus_hashes::Hash;
use std::collections::hash_map::Entry;

use super::{CACHE_ENTRY_OVERHEAD, CacheFlags, Coin, CoinsCacheEntry, CoinsMap, CoinsView, StoreResult};
use crate::{
    BlockHeight,
    constants::MAX_OUTPUTS_PER_TX,
    tx::{Transaction, TransactionId, TransactionOutpoint},
};

/// Reads from the backing view are assumed infallible by every caller. A failed read cannot
/// be told apart from a missing coin, so it halts the process.
fn expect_store<T>(result: StoreResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            error!("Error reading from the coin database: {}", err);
            panic!("unrecoverable coin database error: {err}");
        }
    }
}

/// A write-back cache over a [`CoinsView`].
///
/// Entries flagged DIRTY hold changes the backing view has not seen yet, entries flagged
/// FRESH are unknown to it. A spend of a FRESH coin removes the entry altogether, so coins
/// created and spent between two flushes never reach the backing view.
///
/// Memory usage is kept under `max_bytes` by evicting clean entries, least recently accessed
/// first, whenever an insertion crosses the ceiling.
pub struct CoinsViewCache<V: CoinsView> {
    backing: V,
    cache_coins: CoinsMap,
    cached_coins_usage: usize,
    best_block: Option<Hash>,
    access_counter: u64,
    max_bytes: usize,
}

impl<V: CoinsView> CoinsViewCache<V> {
    pub fn new(backing: V, max_bytes: usize) -> Self {
        Self { backing, cache_coins: CoinsMap::new(), cached_coins_usage: 0, best_block: None, access_counter: 0, max_bytes }
    }

    pub fn backing(&self) -> &V {
        &self.backing
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn next_access(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    /// Returns the cache entry of `outpoint`, pulling it from the backing view on a miss.
    /// Coins the backing view does not hold are not cached.
    fn fetch_coin(&mut self, outpoint: &TransactionOutpoint) -> Option<&mut CoinsCacheEntry> {
        let access = self.next_access();
        let entry = match self.cache_coins.entry(*outpoint) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let coin = expect_store(self.backing.get_coin(outpoint))?;
                let entry = CoinsCacheEntry::new(Some(coin), CacheFlags::empty(), access);
                self.cached_coins_usage += entry.memory_usage();
                vacant.insert(entry)
            }
        };
        entry.last_access = access;
        Some(entry)
    }

    /// Returns the unspent coin at `outpoint`
    pub fn get(&mut self, outpoint: &TransactionOutpoint) -> Option<Coin> {
        self.fetch_coin(outpoint).and_then(|entry| entry.coin.clone())
    }

    /// Like [`Self::get`] without cloning the coin
    pub fn access_coin(&mut self, outpoint: &TransactionOutpoint) -> Option<&Coin> {
        self.fetch_coin(outpoint).and_then(|entry| entry.coin.as_ref())
    }

    pub fn have(&mut self, outpoint: &TransactionOutpoint) -> bool {
        self.fetch_coin(outpoint).is_some_and(|entry| !entry.is_spent())
    }

    /// Checks for an unspent coin without consulting the backing view
    pub fn have_in_cache(&self, outpoint: &TransactionOutpoint) -> bool {
        self.cache_coins.get(outpoint).is_some_and(|entry| !entry.is_spent())
    }

    pub fn cache_entry(&self, outpoint: &TransactionOutpoint) -> Option<&CoinsCacheEntry> {
        self.cache_coins.get(outpoint)
    }

    /// Adds a coin. Unspendable coins are dropped. Unless `possible_overwrite` is set, an
    /// existing unspent coin is left untouched.
    pub fn add(&mut self, outpoint: TransactionOutpoint, coin: Coin, possible_overwrite: bool) {
        if coin.output.script_public_key.is_unspendable() {
            return;
        }

        let access = self.next_access();
        let added_usage = coin.dynamic_memory_usage();
        match self.cache_coins.entry(outpoint) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                if !possible_overwrite && !entry.is_spent() {
                    return;
                }
                let removed_usage = entry.coin.as_ref().map_or(0, Coin::dynamic_memory_usage);
                self.cached_coins_usage = self.cached_coins_usage - removed_usage + added_usage;
                entry.coin = Some(coin);
                entry.flags.insert(CacheFlags::DIRTY);
                entry.last_access = access;
            }
            Entry::Vacant(vacant) => {
                self.cached_coins_usage += CACHE_ENTRY_OVERHEAD + added_usage;
                vacant.insert(CoinsCacheEntry::new(Some(coin), CacheFlags::DIRTY | CacheFlags::FRESH, access));
            }
        }

        if self.cached_coins_usage > self.max_bytes {
            self.reallocate();
        }
    }

    /// Adds all outputs of `tx` as coins created at `height`.
    ///
    /// With `check_for_overwrite` an output may replace an existing unspent coin only if one
    /// exists, otherwise only coinbase outputs may, which covers historical duplicate coinbases.
    pub fn add_coins(&mut self, tx: &Transaction, height: BlockHeight, check_for_overwrite: bool) {
        let is_coinbase = tx.is_coinbase();
        let txid = tx.id();
        for (index, output) in tx.outputs.iter().enumerate() {
            let outpoint = TransactionOutpoint::new(txid, index as u32);
            let overwrite = if check_for_overwrite { self.have(&outpoint) } else { is_coinbase };
            self.add(outpoint, Coin::new(output.clone(), height, is_coinbase), overwrite);
        }
    }

    /// Spends the coin at `outpoint` and returns it. Returns `None` if there is no such
    /// coin or it was already spent.
    pub fn spend(&mut self, outpoint: &TransactionOutpoint) -> Option<Coin> {
        let (coin, fresh) = {
            let entry = self.fetch_coin(outpoint)?;
            let fresh = entry.is_fresh();
            if !fresh {
                entry.flags.insert(CacheFlags::DIRTY);
            }
            (entry.coin.take(), fresh)
        };

        let released = coin.as_ref().map_or(0, Coin::dynamic_memory_usage);
        if fresh {
            self.cache_coins.remove(outpoint);
            self.cached_coins_usage -= CACHE_ENTRY_OVERHEAD + released;
        } else {
            self.cached_coins_usage -= released;
        }
        coin
    }

    /// Merges the entries of a child cache into this one and adopts its best block
    pub fn batch_write(&mut self, coins: CoinsMap, best_block: Hash) {
        for (outpoint, child) in coins {
            // Clean entries carry nothing new
            if !child.is_dirty() {
                continue;
            }
            let access = self.next_access();
            match self.cache_coins.entry(outpoint) {
                Entry::Vacant(vacant) => {
                    // Created and spent within the child, nobody below ever saw it
                    if child.is_fresh() && child.is_spent() {
                        continue;
                    }
                    // FRESH may only propagate from the child. A non-FRESH child entry might
                    // have just been flushed from here and exist further below.
                    let flags = if child.is_fresh() { CacheFlags::DIRTY | CacheFlags::FRESH } else { CacheFlags::DIRTY };
                    let entry = CoinsCacheEntry::new(child.coin, flags, access);
                    self.cached_coins_usage += entry.memory_usage();
                    vacant.insert(entry);
                }
                Entry::Occupied(mut occupied) => {
                    if child.is_fresh() && !occupied.get().is_spent() {
                        error!("Coin cache corrupted: FRESH child entry {} shadows an unspent coin", outpoint);
                        panic!("FRESH flag misapplied to coin that exists in parent cache");
                    }

                    if occupied.get().is_fresh() && child.is_spent() {
                        let removed = occupied.remove();
                        self.cached_coins_usage -= removed.memory_usage();
                    } else {
                        let entry = occupied.get_mut();
                        self.cached_coins_usage -= entry.memory_usage();
                        entry.coin = child.coin;
                        // Never FRESH here: a spend of an entry that exists below must reach it
                        entry.flags.insert(CacheFlags::DIRTY);
                        entry.last_access = access;
                        self.cached_coins_usage += entry.memory_usage();
                    }
                }
            }
        }
        self.best_block = Some(best_block);
    }

    /// Writes all entries to the backing view and empties the cache
    pub fn flush(&mut self) -> StoreResult<()> {
        let best_block = CoinsViewCache::best_block(self);
        let coins = std::mem::take(&mut self.cache_coins);
        let count = coins.len();
        self.cached_coins_usage = 0;
        let result = self.backing.batch_write(coins, best_block);
        debug!("Flushed {} coin cache entries at best block {}", count, best_block);
        result
    }

    /// Drops the entry of `outpoint` unless it holds unflushed changes
    pub fn uncache(&mut self, outpoint: &TransactionOutpoint) {
        if let Entry::Occupied(occupied) = self.cache_coins.entry(*outpoint) {
            if !occupied.get().is_dirty() {
                let removed = occupied.remove();
                self.cached_coins_usage -= removed.memory_usage();
            }
        }
    }

    /// Evicts clean entries in ascending access order until usage is down to 80% of the ceiling
    fn reallocate(&mut self) {
        let target = self.max_bytes - self.max_bytes / 5;
        let mut candidates = self
            .cache_coins
            .iter()
            .filter(|(_, entry)| !entry.is_dirty())
            .map(|(outpoint, entry)| (entry.last_access, *outpoint))
            .collect::<Vec<_>>();
        candidates.sort_unstable();

        let mut evicted = 0;
        for (_, outpoint) in candidates {
            if self.cached_coins_usage <= target {
                break;
            }
            if let Some(removed) = self.cache_coins.remove(&outpoint) {
                self.cached_coins_usage -= removed.memory_usage();
                evicted += 1;
            }
        }
        debug!("Coin cache evicted {} clean entries, usage is now {} of {} bytes", evicted, self.cached_coins_usage, self.max_bytes);
    }

    /// The block whose coin set this cache represents, defaulting to the one of the backing view
    pub fn best_block(&self) -> Hash {
        match self.best_block {
            Some(hash) => hash,
            None => expect_store(self.backing.best_block()),
        }
    }

    pub fn set_best_block(&mut self, hash: Hash) {
        self.best_block = Some(hash);
    }

    /// Number of cached entries, spent ones included
    pub fn cache_size(&self) -> usize {
        self.cache_coins.len()
    }

    /// Memory accounted to the cached entries in bytes
    pub fn dynamic_memory_usage(&self) -> usize {
        self.cached_coins_usage
    }

    /// Whether all coins spent by `tx` exist and are unspent. Trivially true for coinbases.
    pub fn have_inputs(&mut self, tx: &Transaction) -> bool {
        tx.is_coinbase() || tx.inputs.iter().all(|input| self.have(&input.previous_outpoint))
    }

    /// Returns the unspent output of `txid` with the lowest index
    pub fn access_by_txid(&mut self, txid: TransactionId) -> Option<Coin> {
        for index in 0..MAX_OUTPUTS_PER_TX {
            if let Some(coin) = self.access_coin(&TransactionOutpoint::new(txid, index)) {
                return Some(coin.clone());
            }
        }
        None
    }
}

impl<V: CoinsView> CoinsView for CoinsViewCache<V> {
    fn get_coin(&self, outpoint: &TransactionOutpoint) -> StoreResult<Option<Coin>> {
        match self.cache_coins.get(outpoint) {
            Some(entry) => Ok(entry.coin.clone()),
            None => self.backing.get_coin(outpoint),
        }
    }

    fn best_block(&self) -> StoreResult<Hash> {
        match self.best_block {
            Some(hash) => Ok(hash),
            None => self.backing.best_block(),
        }
    }

    fn batch_write(&mut self, coins: CoinsMap, best_block: Hash) -> StoreResult<()> {
        CoinsViewCache::batch_write(self, coins, best_block);
        Ok(())
    }
}
