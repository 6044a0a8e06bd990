use std::sync::Arc;

use lotus_consensus_core::{
    BlockHash, BlockHeight,
    block::Block,
    config::Config,
    errors::tx::TxResult,
    tx::{Transaction, TransactionId, TransactionOutpoint},
    utxo::{Coin, CoinsView, CoinsViewCache, StoreResult},
};
use lotus_core::{debug, info};
use lotus_txscript::flags::MANDATORY_SCRIPT_VERIFY_FLAGS;
use parking_lot::Mutex;

use crate::{
    errors::{BlockProcessResult, BlockRuleError},
    processes::transaction_validator::TransactionValidator,
    token_inquirer::{self, TokenInfo},
};

/// The validated tip of the chain: the coin set after the last connected block.
///
/// The tip cache is guarded by a single lock, held for the whole connection of a block or
/// validation of a mempool transaction.
pub struct ChainState<V: CoinsView> {
    config: Arc<Config>,
    validator: TransactionValidator,
    tip: Mutex<CoinsViewCache<V>>,
}

impl<V: CoinsView> ChainState<V> {
    pub fn new(config: Arc<Config>, backing: V) -> Self {
        let validator = TransactionValidator::from_config(&config);
        let tip = Mutex::new(CoinsViewCache::new(backing, config.coin_cache_max_bytes));
        Self { config, validator, tip }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validator(&self) -> &TransactionValidator {
        &self.validator
    }

    pub fn best_block(&self) -> BlockHash {
        self.tip.lock().best_block()
    }

    /// Validates `block` as the child of the tip at `height` and applies it. The tip is left
    /// untouched when any transaction fails. With `flush` set the tip is written through to the
    /// backing view afterwards. Returns the fees collected by the block.
    pub fn connect_block(&self, block: &Block, height: BlockHeight, flush: bool) -> BlockProcessResult<i64> {
        check_block_structure(block)?;

        let mut tip = self.tip.lock();
        let expected = tip.best_block();
        if block.parent_hash != expected {
            return Err(BlockRuleError::WrongParent { expected, got: block.parent_hash });
        }

        let mut view = CoinsViewCache::new(&mut *tip, self.config.coin_cache_max_bytes);
        let mut fees = 0i64;
        for tx in block.transactions.iter() {
            let fee = self
                .validator
                .validate_and_connect_transaction(tx, &mut view, height, MANDATORY_SCRIPT_VERIFY_FLAGS)
                .map_err(|err| BlockRuleError::InvalidTransaction(tx.id(), err))?;
            // Each fee is bounded by max money, as is the sum of a block's outputs
            fees = fees.saturating_add(fee);
        }
        view.set_best_block(block.hash);
        view.flush()?;

        if flush {
            tip.flush()?;
        }
        info!("Connected block {} at height {} with {} transactions", block.hash, height, block.transactions.len());
        Ok(fees)
    }

    /// Validates `tx` for the mempool against the tip, as if it were mined at `height`.
    /// Returns its fee.
    pub fn accept_to_mempool(&self, tx: &Transaction, height: BlockHeight) -> TxResult<i64> {
        let mut tip = self.tip.lock();
        let result = self.validator.validate_for_mempool(tx, &mut *tip, height);
        if let Err(err) = &result {
            debug!("Rejected transaction {} from the mempool: {} ({})", tx.id(), err, err.reject_reason());
        }
        result
    }

    /// Writes the tip cache through to the backing view
    pub fn flush(&self) -> StoreResult<()> {
        self.tip.lock().flush()
    }

    pub fn coin(&self, outpoint: &TransactionOutpoint) -> Option<Coin> {
        self.tip.lock().get(outpoint)
    }

    pub fn token_info(&self, txid: TransactionId, index: u32) -> TokenInfo {
        token_inquirer::token_info(&mut *self.tip.lock(), txid, index, self.config.net.into())
    }

    /// Runs `f` with exclusive access to the tip cache
    pub fn with_coins<R>(&self, f: impl FnOnce(&mut CoinsViewCache<V>) -> R) -> R {
        f(&mut *self.tip.lock())
    }
}

fn check_block_structure(block: &Block) -> BlockProcessResult<()> {
    if block.is_empty() {
        return Err(BlockRuleError::NoTransactions);
    }
    if block.coinbase().is_none() {
        return Err(BlockRuleError::FirstTxNotCoinbase);
    }
    if let Some(index) = block.transactions.iter().skip(1).position(|tx| tx.is_coinbase()) {
        return Err(BlockRuleError::MultipleCoinbases(index + 1));
    }
    Ok(())
}
