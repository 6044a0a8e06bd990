use borsh::{BorshDeserialize, BorshSerialize};
use lotus_utils::mem_size::MemSizeEstimator;
use serde::{Deserialize, Serialize};
use std::mem::size_of;

use crate::{BlockHeight, tx::TransactionOutput};

/// An unspent transaction output together with the context it was created in
#[derive(Clone, Debug, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Coin {
    pub output: TransactionOutput,
    /// Height of the block which created the output
    pub height: BlockHeight,
    pub is_coinbase: bool,
}

impl Coin {
    pub fn new(output: TransactionOutput, height: BlockHeight, is_coinbase: bool) -> Self {
        Self { output, height, is_coinbase }
    }

    pub fn value(&self) -> i64 {
        self.output.value
    }

    pub fn script(&self) -> &[u8] {
        self.output.script_public_key.script()
    }

    /// Heap memory owned by this coin
    pub fn dynamic_memory_usage(&self) -> usize {
        self.output.script_public_key.heap_size()
    }
}

impl MemSizeEstimator for Coin {
    fn estimate_mem_bytes(&self) -> usize {
        size_of::<Self>() + self.dynamic_memory_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::ScriptPublicKey;

    #[test]
    fn test_memory_usage() {
        let small = Coin::new(TransactionOutput::new(1, ScriptPublicKey::from_vec(vec![0x51; 25])), 1, false);
        assert_eq!(small.dynamic_memory_usage(), 0);
        assert_eq!(small.estimate_mem_bytes(), size_of::<Coin>());

        let covenant = Coin::new(TransactionOutput::new(1, ScriptPublicKey::from_vec(vec![0x51; 91])), 1, false);
        assert!(covenant.dynamic_memory_usage() >= 91);
        assert_eq!(covenant.value(), 1);
        assert_eq!(covenant.script().len(), 91);
    }
}
