use std::sync::Arc;

use crate::{BlockHash, tx::Transaction};

/// A block as seen by validation: its identity, its parent and its transactions, the first of
/// which must be the coinbase. Header fields are validated elsewhere.
#[derive(Debug, Clone)]
pub struct Block {
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub transactions: Arc<Vec<Transaction>>,
}

impl Block {
    pub fn new(hash: BlockHash, parent_hash: BlockHash, transactions: Vec<Transaction>) -> Self {
        Self { hash, parent_hash, transactions: Arc::new(transactions) }
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
