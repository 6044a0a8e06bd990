use lotus_consensus_core::{
    BlockHeight,
    errors::tx::{TxResult, TxRuleError},
    hashing::sighash::SigHashReusedValues,
    tx::{TransactionInput, VerifiableTransaction},
};
use lotus_txscript::{SigCacheKey, TxScriptEngine, caches::Cache, context::TransactionChecker, flags::ScriptFlags};
use lotus_txscript_errors::TxScriptError;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use super::TransactionValidator;

/// A script failure together with the index of the failing input
pub type InputScriptError = (usize, TxScriptError);

impl TransactionValidator {
    /// Checks `tx` against the coins it spends and verifies its scripts under `flags`.
    /// Returns the fee.
    pub fn validate_populated_transaction_and_get_fee(
        &self,
        tx: &(impl VerifiableTransaction + Sync),
        height: BlockHeight,
        flags: ScriptFlags,
    ) -> TxResult<i64> {
        let fee = self.check_populated_amounts(tx, height)?;
        let sig_checks = self.check_scripts(tx, flags)?;
        self.check_sig_checks(sig_checks)?;
        Ok(fee)
    }

    /// Coinbase maturity and value checks. Returns the fee.
    pub fn check_populated_amounts(&self, tx: &impl VerifiableTransaction, height: BlockHeight) -> TxResult<i64> {
        self.check_transaction_coinbase_maturity(tx, height)?;
        let total_in = self.check_transaction_input_amounts(tx)?;
        let total_out = check_transaction_output_values(tx, total_in)?;
        Ok((total_in - total_out) as i64)
    }

    fn check_transaction_coinbase_maturity(&self, tx: &impl VerifiableTransaction, height: BlockHeight) -> TxResult<()> {
        let maturity = self.params.coinbase_maturity;
        if let Some((index, (input, coin))) =
            tx.populated_inputs().enumerate().find(|(_, (_, coin))| coin.is_coinbase && height.saturating_sub(coin.height) < maturity)
        {
            return Err(TxRuleError::ImmatureCoinbaseSpend(index, input.previous_outpoint, coin.height, height, maturity));
        }
        Ok(())
    }

    fn check_transaction_input_amounts(&self, tx: &impl VerifiableTransaction) -> TxResult<i128> {
        let max_money = self.params.max_money;
        let mut total: i128 = 0;
        for (_, coin) in tx.populated_inputs() {
            if !(0..=max_money).contains(&coin.value()) {
                return Err(TxRuleError::InputAmountOutOfRange(coin.value()));
            }
            total += coin.value() as i128;
            if total > max_money as i128 {
                return Err(TxRuleError::InputAmountTooHigh);
            }
        }
        Ok(total)
    }

    pub fn check_sig_checks(&self, sig_checks: usize) -> TxResult<()> {
        if sig_checks > self.params.max_tx_sigchecks {
            return Err(TxRuleError::TooManySigChecks(sig_checks, self.params.max_tx_sigchecks));
        }
        Ok(())
    }

    /// Verifies the scripts of every input. Returns the number of signature checks executed.
    pub fn check_scripts(&self, tx: &(impl VerifiableTransaction + Sync), flags: ScriptFlags) -> TxResult<usize> {
        self.verify_scripts(tx, flags).map_err(|(index, err)| map_script_err(err, &tx.inputs()[index]))
    }

    pub(crate) fn verify_scripts(
        &self,
        tx: &(impl VerifiableTransaction + Sync),
        flags: ScriptFlags,
    ) -> Result<usize, InputScriptError> {
        if tx.inputs().len() >= self.parallel_script_check_threshold {
            check_scripts_par_iter(&self.sig_cache, tx, flags)
        } else {
            check_scripts_sequential(&self.sig_cache, tx, flags)
        }
    }
}

fn check_transaction_output_values(tx: &impl VerifiableTransaction, total_in: i128) -> TxResult<i128> {
    // Output values were range checked in isolation
    let total_out: i128 = tx.outputs().iter().map(|out| out.value as i128).sum();
    if total_in < total_out {
        return Err(TxRuleError::SpendTooHigh(total_out, total_in));
    }
    Ok(total_out)
}

fn verify_input(
    sig_cache: &Cache<SigCacheKey, bool>,
    tx: &impl VerifiableTransaction,
    index: usize,
    reused_values: &SigHashReusedValues,
    flags: ScriptFlags,
) -> Result<usize, InputScriptError> {
    let ctx = TransactionChecker::new(tx, index, reused_values, sig_cache);
    let mut vm = TxScriptEngine::from_transaction_input(&ctx, flags);
    vm.execute().map_err(|err| (index, err))?;
    Ok(vm.sig_checks())
}

pub fn check_scripts_sequential(
    sig_cache: &Cache<SigCacheKey, bool>,
    tx: &impl VerifiableTransaction,
    flags: ScriptFlags,
) -> Result<usize, InputScriptError> {
    let reused_values = SigHashReusedValues::new();
    (0..tx.inputs().len()).try_fold(0, |sig_checks, index| Ok(sig_checks + verify_input(sig_cache, tx, index, &reused_values, flags)?))
}

/// Verifies all inputs in parallel. The reported failure is the one of the lowest failing
/// input, as in sequential verification.
pub fn check_scripts_par_iter(
    sig_cache: &Cache<SigCacheKey, bool>,
    tx: &(impl VerifiableTransaction + Sync),
    flags: ScriptFlags,
) -> Result<usize, InputScriptError> {
    let reused_values = SigHashReusedValues::new();
    let results: Vec<_> =
        (0..tx.inputs().len()).into_par_iter().map(|index| verify_input(sig_cache, tx, index, &reused_values, flags)).collect();
    results.into_iter().try_fold(0, |sig_checks, result| Ok(sig_checks + result?))
}

fn map_script_err(script_err: TxScriptError, input: &TransactionInput) -> TxRuleError {
    if input.signature_script.is_empty() {
        TxRuleError::SignatureEmpty(script_err)
    } else {
        TxRuleError::SignatureInvalid(script_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processes::transaction_validator::test_helpers::*;
    use lotus_consensus_core::{
        config::{Config, params::REGTEST_PARAMS},
        sign::p2pkh_script_for_key,
        tx::{PopulatedTransaction, ScriptPublicKey, Transaction, TransactionOutpoint, TransactionOutput},
        utxo::Coin,
    };
    use lotus_txscript::flags::MANDATORY_SCRIPT_VERIFY_FLAGS;

    fn validator_with_threshold(threshold: usize) -> TransactionValidator {
        TransactionValidator::from_config(&Config { parallel_script_check_threshold: threshold, ..Config::new(REGTEST_PARAMS) })
    }

    #[test]
    fn check_signature_test() {
        let keypair = keypair(9);
        let values = [1_000; 6];
        let (mut coins, outpoints) = funded_cache(&keypair, &values, 1);
        let tx = signed_spend(&mut coins, &keypair, &outpoints, vec![(5_500, p2pkh_script_for_key(&keypair))]);
        let entries: Vec<Coin> = outpoints.iter().map(|outpoint| coins.get(outpoint).unwrap()).collect();
        let populated = PopulatedTransaction::new(&tx, entries.clone());

        for threshold in [1, 100] {
            let tv = validator_with_threshold(threshold);
            assert_eq!(tv.validate_populated_transaction_and_get_fee(&populated, 10, MANDATORY_SCRIPT_VERIFY_FLAGS), Ok(500));
            assert_eq!(tv.check_scripts(&populated, MANDATORY_SCRIPT_VERIFY_FLAGS), Ok(6));
        }

        // Break the signatures of inputs 2 and 4. Both paths report input 2.
        let mut broken = tx.clone();
        for index in [2, 4] {
            let script = &mut broken.inputs[index].signature_script;
            // Last byte of the DER signature, before the hash type
            let sig_len = script[0] as usize;
            script[sig_len - 1] ^= 0x01;
        }
        broken.finalize();
        let populated = PopulatedTransaction::new(&broken, entries);
        let sequential = validator_with_threshold(100).verify_scripts(&populated, MANDATORY_SCRIPT_VERIFY_FLAGS);
        let parallel = validator_with_threshold(1).verify_scripts(&populated, MANDATORY_SCRIPT_VERIFY_FLAGS);
        assert!(matches!(sequential, Err((2, _))), "{sequential:?}");
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn check_empty_signature_script_test() {
        let keypair = keypair(10);
        let (mut coins, outpoints) = funded_cache(&keypair, &[1_000], 1);
        let mut tx = signed_spend(&mut coins, &keypair, &outpoints, vec![(900, p2pkh_script_for_key(&keypair))]);
        tx.inputs[0].signature_script.clear();
        tx.finalize();
        let populated = PopulatedTransaction::new(&tx, vec![coins.get(&outpoints[0]).unwrap()]);

        let tv = validator_with_threshold(100);
        assert_eq!(
            tv.check_scripts(&populated, MANDATORY_SCRIPT_VERIFY_FLAGS),
            Err(TxRuleError::SignatureEmpty(TxScriptError::InvalidStackOperation(1, 0)))
        );
    }

    #[test]
    fn check_amounts_test() {
        let tv = validator_with_threshold(100);
        let anyone = ScriptPublicKey::from_vec(vec![0x51]);
        let tx = Transaction::new(
            2,
            vec![lotus_consensus_core::tx::TransactionInput::new(TransactionOutpoint::new(5.into(), 0), vec![], u32::MAX)],
            vec![TransactionOutput::new(700, anyone.clone())],
            0,
        );

        let coinbase_coin = Coin::new(TransactionOutput::new(1_000, anyone.clone()), 50, true);
        let populated = PopulatedTransaction::new(&tx, vec![coinbase_coin.clone()]);
        assert_eq!(
            tv.check_populated_amounts(&populated, 149),
            Err(TxRuleError::ImmatureCoinbaseSpend(0, tx.inputs[0].previous_outpoint, 50, 149, 100))
        );
        assert_eq!(tv.check_populated_amounts(&populated, 150), Ok(300));

        let populated = PopulatedTransaction::new(&tx, vec![Coin::new(TransactionOutput::new(600, anyone.clone()), 1, false)]);
        assert_eq!(tv.check_populated_amounts(&populated, 10), Err(TxRuleError::SpendTooHigh(700, 600)));

        let populated = PopulatedTransaction::new(&tx, vec![Coin::new(TransactionOutput::new(-5, anyone), 1, false)]);
        assert_eq!(tv.check_populated_amounts(&populated, 10), Err(TxRuleError::InputAmountOutOfRange(-5)));
    }

    #[test]
    fn check_sig_checks_test() {
        let tv = validator_with_threshold(100);
        assert_eq!(tv.check_sig_checks(3000), Ok(()));
        assert_eq!(tv.check_sig_checks(3001), Err(TxRuleError::TooManySigChecks(3001, 3000)));
    }
}
