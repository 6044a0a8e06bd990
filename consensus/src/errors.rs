use lotus_consensus_core::{
    errors::tx::TxRuleError,
    tx::TransactionId,
    utxo::StoreError,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockRuleError {
    #[error("block has no transactions")]
    NoTransactions,

    #[error("first transaction in block is not a coinbase")]
    FirstTxNotCoinbase,

    #[error("block contains a second coinbase at index {0}")]
    MultipleCoinbases(usize),

    #[error("block builds on {got} instead of the tip {expected}")]
    WrongParent { expected: lotus_hashes::Hash, got: lotus_hashes::Hash },

    #[error("transaction {0} is invalid: {1}")]
    InvalidTransaction(TransactionId, TxRuleError),

    #[error("coin store failure: {0}")]
    Store(#[from] StoreError),
}

impl BlockRuleError {
    /// Short machine readable rejection reason
    pub fn reject_reason(&self) -> &'static str {
        match self {
            BlockRuleError::NoTransactions | BlockRuleError::FirstTxNotCoinbase => "bad-cb-missing",
            BlockRuleError::MultipleCoinbases(_) => "bad-cb-multiple",
            BlockRuleError::WrongParent { .. } => "bad-prevblk",
            BlockRuleError::InvalidTransaction(_, err) => err.reject_reason(),
            BlockRuleError::Store(_) => "coin-store-failure",
        }
    }
}

pub type BlockProcessResult<T> = std::result::Result<T, BlockRuleError>;
