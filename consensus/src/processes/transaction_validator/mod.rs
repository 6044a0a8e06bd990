pub mod covenant_rules;
mod tx_validation_in_isolation;
pub mod tx_validation_in_utxo_context;

use lotus_consensus_core::{
    BlockHeight,
    config::{Config, params::Params},
    errors::tx::{TxResult, TxRuleError},
    tx::{PopulatedTransaction, Transaction, TransactionOutpoint},
    utxo::{Coin, CoinsView, CoinsViewCache},
};
use lotus_core::trace;
use lotus_txscript::{
    SigCacheKey,
    caches::Cache,
    flags::{MANDATORY_SCRIPT_VERIFY_FLAGS, STANDARD_SCRIPT_VERIFY_FLAGS, ScriptFlags},
};

pub use tx_validation_in_isolation::*;

/// Number of verified signatures remembered across transactions
const SIG_CACHE_SIZE: u64 = 10_000;

#[derive(Clone)]
pub struct TransactionValidator {
    params: Params,
    parallel_script_check_threshold: usize,
    accept_non_standard: bool,
    sig_cache: Cache<SigCacheKey, bool>,
}

impl TransactionValidator {
    pub fn new(params: Params) -> Self {
        Self::from_config(&Config::new(params))
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            params: config.params.clone(),
            parallel_script_check_threshold: config.parallel_script_check_threshold,
            accept_non_standard: config.accept_non_standard,
            sig_cache: Cache::new(SIG_CACHE_SIZE),
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Script flags the mempool verifies transactions with
    pub fn mempool_script_flags(&self) -> ScriptFlags {
        if self.accept_non_standard { MANDATORY_SCRIPT_VERIFY_FLAGS } else { STANDARD_SCRIPT_VERIFY_FLAGS }
    }

    /// Validates `tx` as part of a block at `height` and applies it to `coins`: its inputs are
    /// spent and its outputs added. On error `coins` may hold fetched entries but no changes.
    /// Returns the fee paid by the transaction.
    pub fn validate_and_connect_transaction<V: CoinsView>(
        &self,
        tx: &Transaction,
        coins: &mut CoinsViewCache<V>,
        height: BlockHeight,
        flags: ScriptFlags,
    ) -> TxResult<i64> {
        self.validate_tx_in_isolation(tx)?;
        check_no_unspent_outputs(tx, coins)?;

        let fee = if tx.is_coinbase() {
            0
        } else {
            let entries = populate_inputs(tx, coins)?;
            let populated = PopulatedTransaction::new(tx, entries);
            let fee = self.validate_populated_transaction_and_get_fee(&populated, height, flags)?;
            self.check_covenant_rules(tx, coins, height)?;

            for input in tx.inputs.iter() {
                coins.spend(&input.previous_outpoint);
            }
            fee
        };

        coins.add_coins(tx, height, false);
        trace!("connected transaction {} at height {} paying a fee of {}", tx.id(), height, fee);
        Ok(fee)
    }

    /// Validates `tx` for acceptance to the mempool, as if included in a block at `height`.
    /// `coins` is left without changes.
    ///
    /// Script failures are classified by re-running the scripts under the mandatory flags: a
    /// transaction passing them only broke relay policy.
    pub fn validate_for_mempool<V: CoinsView>(
        &self,
        tx: &Transaction,
        coins: &mut CoinsViewCache<V>,
        height: BlockHeight,
    ) -> TxResult<i64> {
        self.validate_tx_in_isolation(tx)?;
        if tx.is_coinbase() {
            return Err(TxRuleError::CoinbaseInMempool);
        }

        let entries = populate_inputs(tx, coins)?;
        let populated = PopulatedTransaction::new(tx, entries);
        let fee = self.check_populated_amounts(&populated, height)?;

        let flags = self.mempool_script_flags();
        let sig_checks = match self.verify_scripts(&populated, flags) {
            Ok(sig_checks) => sig_checks,
            Err((index, err)) if flags != MANDATORY_SCRIPT_VERIFY_FLAGS => {
                return Err(match self.verify_scripts(&populated, MANDATORY_SCRIPT_VERIFY_FLAGS) {
                    Ok(_) => TxRuleError::NonMandatoryScriptVerify(index, err),
                    Err((index, err)) => TxRuleError::MandatoryScriptVerify(index, err),
                });
            }
            Err((index, err)) => return Err(TxRuleError::MandatoryScriptVerify(index, err)),
        };
        self.check_sig_checks(sig_checks)?;

        self.check_covenant_rules(tx, coins, height)?;
        Ok(fee)
    }
}

/// A transaction may not recreate outputs that are still unspent, as a repeated coinbase would
fn check_no_unspent_outputs<V: CoinsView>(tx: &Transaction, coins: &mut CoinsViewCache<V>) -> TxResult<()> {
    match (0..tx.outputs.len() as u32).map(|index| tx.outpoint(index)).find(|outpoint| coins.have(outpoint)) {
        Some(outpoint) => Err(TxRuleError::OverwritesUnspentOutput(outpoint)),
        None => Ok(()),
    }
}

/// Resolves the coins spent by `tx`, reporting every missing one
fn populate_inputs<V: CoinsView>(tx: &Transaction, coins: &mut CoinsViewCache<V>) -> TxResult<Vec<Coin>> {
    let mut entries = Vec::with_capacity(tx.inputs.len());
    let mut missing: Vec<TransactionOutpoint> = Vec::new();
    for input in tx.inputs.iter() {
        match coins.get(&input.previous_outpoint) {
            Some(coin) => entries.push(coin),
            None => missing.push(input.previous_outpoint),
        }
    }
    if !missing.is_empty() {
        return Err(TxRuleError::MissingInputs(missing));
    }
    Ok(entries)
}


#[cfg(test)]
mod tests {
    use super::{test_helpers::*, *};
    use lotus_consensus_core::{
        config::params::REGTEST_PARAMS,
        sign::p2pkh_script_for_key,
        tx::{ScriptPublicKey, TransactionInput},
    };
    use lotus_txscript_errors::TxScriptError;

    #[test]
    fn test_connect_signed_transaction() {
        let keypair = keypair(1);
        let (mut coins, outpoints) = funded_cache(&keypair, &[5_000, 3_000], 1);
        let tx = signed_spend(&mut coins, &keypair, &outpoints, vec![(6_000, p2pkh_script_for_key(&keypair)), (1_500, p2pkh_script_for_key(&keypair))]);

        let validator = TransactionValidator::new(REGTEST_PARAMS);
        assert_eq!(validator.validate_for_mempool(&tx, &mut coins, 200), Ok(500));
        assert!(coins.have(&outpoints[0]));

        assert_eq!(validator.validate_and_connect_transaction(&tx, &mut coins, 200, MANDATORY_SCRIPT_VERIFY_FLAGS), Ok(500));
        assert!(!coins.have(&outpoints[0]));
        assert!(!coins.have(&outpoints[1]));
        assert_eq!(coins.get(&tx.outpoint(0)).map(|coin| coin.value()), Some(6_000));
        assert_eq!(coins.get(&tx.outpoint(1)).map(|coin| coin.height), Some(200));

        // Spent coins are gone
        let err = validator.validate_and_connect_transaction(&tx, &mut coins, 201, MANDATORY_SCRIPT_VERIFY_FLAGS).unwrap_err();
        assert_eq!(err, TxRuleError::MissingInputs(outpoints.clone()));
        assert_eq!(err.reject_reason(), "bad-txns-inputs-missingorspent");
    }

    #[test]
    fn test_failed_transaction_leaves_coins_untouched() {
        let keypair = keypair(2);
        let (mut coins, outpoints) = funded_cache(&keypair, &[5_000], 1);
        let mut tx = signed_spend(&mut coins, &keypair, &outpoints, vec![(4_000, p2pkh_script_for_key(&keypair))]);
        // Committing to a different output invalidates the signature
        tx.outputs[0].value = 4_500;
        tx.finalize();

        let validator = TransactionValidator::new(REGTEST_PARAMS);
        let err = validator.validate_and_connect_transaction(&tx, &mut coins, 200, MANDATORY_SCRIPT_VERIFY_FLAGS).unwrap_err();
        assert_eq!(err, TxRuleError::SignatureInvalid(TxScriptError::NullFail));
        assert!(coins.have(&outpoints[0]));
        assert!(!coins.have(&tx.outpoint(0)));
    }

    #[test]
    fn test_mempool_classifies_policy_failures() {
        let keypair = keypair(3);
        let (mut coins, outpoints) = funded_cache(&keypair, &[5_000], 1);
        let mut tx = signed_spend(&mut coins, &keypair, &outpoints, vec![(4_000, p2pkh_script_for_key(&keypair))]);

        // Re-encode the pubkey push with OP_PUSHDATA1, which only the standard flags reject
        let script = &tx.inputs[0].signature_script;
        let sig_len = script[0] as usize;
        let mut padded = script[..=sig_len].to_vec();
        padded.extend_from_slice(&[0x4c, 33]);
        padded.extend_from_slice(&script[sig_len + 2..]);
        tx.inputs[0] = TransactionInput::new(outpoints[0], padded, u32::MAX);
        tx.finalize();

        let validator = TransactionValidator::new(REGTEST_PARAMS);
        let err = validator.validate_for_mempool(&tx, &mut coins, 200).unwrap_err();
        assert!(matches!(err, TxRuleError::NonMandatoryScriptVerify(0, TxScriptError::NotMinimalData(_))), "{err:?}");
        assert_eq!(err.reject_reason(), "non-mandatory-script-verify-flag");
        assert!(!err.is_consensus_violation());

        let lenient = TransactionValidator::from_config(&Config { accept_non_standard: true, ..Config::new(REGTEST_PARAMS) });
        assert_eq!(lenient.validate_for_mempool(&tx, &mut coins, 200), Ok(1_000));
    }

    #[test]
    fn test_mempool_rejects_consensus_failures_and_coinbases() {
        let keypair = keypair(4);
        let (mut coins, outpoints) = funded_cache(&keypair, &[5_000], 1);
        let mut tx = signed_spend(&mut coins, &keypair, &outpoints, vec![(4_000, p2pkh_script_for_key(&keypair))]);
        tx.inputs[0].signature_script.insert(0, 0x51);
        tx.finalize();

        let validator = TransactionValidator::new(REGTEST_PARAMS);
        let err = validator.validate_for_mempool(&tx, &mut coins, 200).unwrap_err();
        assert_eq!(err, TxRuleError::MandatoryScriptVerify(0, TxScriptError::CleanStack(1)));
        assert_eq!(err.reject_reason(), "mandatory-script-verify-flag-failed");

        let coinbase = Transaction::new(
            2,
            vec![TransactionInput::new(TransactionOutpoint::null(), vec![0x02, 0x01, 0x01], u32::MAX)],
            vec![lotus_consensus_core::tx::TransactionOutput::new(50, ScriptPublicKey::from_vec(vec![0x51; 100]))],
            0,
        );
        assert_eq!(validator.validate_for_mempool(&coinbase, &mut coins, 200), Err(TxRuleError::CoinbaseInMempool));
    }
}
