use lotus_consensus_core::{
    constants::{MAX_COINBASE_SCRIPT_SIG_SIZE, MAX_TX_SIZE, MIN_COINBASE_SCRIPT_SIG_SIZE, MIN_TX_SIZE},
    errors::tx::{TxResult, TxRuleError},
    tx::Transaction,
};
use std::collections::HashSet;

use super::TransactionValidator;

impl TransactionValidator {
    /// Context free checks of `tx`, independent of the coin set and the chain
    pub fn validate_tx_in_isolation(&self, tx: &Transaction) -> TxResult<()> {
        check_transaction_inputs_count(tx)?;
        check_transaction_outputs_count(tx)?;
        check_transaction_size(tx)?;
        self.check_transaction_output_values(tx)?;
        check_duplicate_transaction_inputs(tx)?;

        if tx.is_coinbase() { check_coinbase_script_size(tx) } else { check_null_prevouts(tx) }
    }

    fn check_transaction_output_values(&self, tx: &Transaction) -> TxResult<()> {
        let max_money = self.params.max_money;
        let mut total: i64 = 0;
        for (i, output) in tx.outputs.iter().enumerate() {
            if !(0..=max_money).contains(&output.value) {
                return Err(TxRuleError::BadTxOutValue(i, output.value));
            }
            // Both operands are at most max_money, so the sum cannot overflow
            total += output.value;
            if total > max_money {
                return Err(TxRuleError::TotalTxOutTooHigh);
            }
        }
        Ok(())
    }
}

fn check_transaction_inputs_count(tx: &Transaction) -> TxResult<()> {
    if tx.inputs.is_empty() {
        return Err(TxRuleError::NoTxInputs);
    }
    Ok(())
}

fn check_transaction_outputs_count(tx: &Transaction) -> TxResult<()> {
    if tx.outputs.is_empty() {
        return Err(TxRuleError::NoTxOutputs);
    }
    Ok(())
}

fn check_transaction_size(tx: &Transaction) -> TxResult<()> {
    let size = tx.serialized_size();
    if size > MAX_TX_SIZE {
        return Err(TxRuleError::TxTooLarge(size, MAX_TX_SIZE));
    }
    if size < MIN_TX_SIZE {
        return Err(TxRuleError::TxTooSmall(size, MIN_TX_SIZE));
    }
    Ok(())
}

fn check_duplicate_transaction_inputs(tx: &Transaction) -> TxResult<()> {
    let mut existing = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !existing.insert(input.previous_outpoint) {
            return Err(TxRuleError::TxDuplicateInputs);
        }
    }
    Ok(())
}

fn check_coinbase_script_size(tx: &Transaction) -> TxResult<()> {
    let len = tx.inputs[0].signature_script.len();
    if !(MIN_COINBASE_SCRIPT_SIG_SIZE..=MAX_COINBASE_SCRIPT_SIG_SIZE).contains(&len) {
        return Err(TxRuleError::BadCoinbaseScriptSize(len));
    }
    Ok(())
}

fn check_null_prevouts(tx: &Transaction) -> TxResult<()> {
    if let Some(i) = tx.inputs.iter().position(|input| input.previous_outpoint.is_null()) {
        return Err(TxRuleError::NullPrevout(i));
    }
    Ok(())
}
