//! The view of the spending transaction available to a running script.

use crate::{SigCacheKey, caches::Cache};
use lotus_consensus_core::{
    constants::{LOCK_TIME_THRESHOLD, MAX_TX_IN_SEQUENCE_NUM, SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_MASK, SEQUENCE_LOCKTIME_TYPE_FLAG},
    hashing::{
        sighash::{SigHashReusedValues, calc_signature_hash},
        sighash_type::SigHashType,
    },
    tx::{TransactionInput, TransactionOutput, VerifiableTransaction},
};
use lotus_txscript_errors::TxScriptError;
use secp256k1::{Message, SECP256K1, ecdsa::Signature};

/// Transaction data and signature verification as seen by the script engine.
///
/// Every introspection accessor returns `None` when no transaction is bound to the
/// execution, which the engine reports as [`TxScriptError::NotATransactionInput`].
pub trait TxContext {
    /// Index of the input being verified
    fn input_index(&self) -> Option<usize>;

    /// Locking script of the coin spent by the verified input
    fn active_bytecode(&self) -> Option<&[u8]>;

    /// Unlocking script of the verified input
    fn signature_script(&self) -> Option<&[u8]>;

    fn tx_version(&self) -> Option<i32>;

    fn input_count(&self) -> Option<usize>;

    fn output_count(&self) -> Option<usize>;

    fn lock_time(&self) -> Option<u32>;

    /// The output at `index`, `None` when out of range or without a transaction
    fn output(&self, index: usize) -> Option<&TransactionOutput>;

    /// Value of the coin spent by the verified input
    fn spent_amount(&self) -> Option<i64>;

    /// Verifies a DER signature followed by its hash type byte against `pubkey`.
    /// Encoding rules are enforced by the engine before this is called.
    fn check_sig(&self, sig_with_hashtype: &[u8], pubkey: &[u8], script_code: &[u8]) -> Result<bool, TxScriptError>;

    fn check_lock_time(&self, lock_time: i64) -> Result<(), TxScriptError>;

    fn check_sequence(&self, sequence: i64) -> Result<(), TxScriptError>;
}

/// Context used when running scripts detached from any transaction
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTxContext;

impl TxContext for NoTxContext {
    fn input_index(&self) -> Option<usize> {
        None
    }

    fn active_bytecode(&self) -> Option<&[u8]> {
        None
    }

    fn signature_script(&self) -> Option<&[u8]> {
        None
    }

    fn tx_version(&self) -> Option<i32> {
        None
    }

    fn input_count(&self) -> Option<usize> {
        None
    }

    fn output_count(&self) -> Option<usize> {
        None
    }

    fn lock_time(&self) -> Option<u32> {
        None
    }

    fn output(&self, _index: usize) -> Option<&TransactionOutput> {
        None
    }

    fn spent_amount(&self) -> Option<i64> {
        None
    }

    fn check_sig(&self, _sig_with_hashtype: &[u8], _pubkey: &[u8], _script_code: &[u8]) -> Result<bool, TxScriptError> {
        Ok(false)
    }

    fn check_lock_time(&self, _lock_time: i64) -> Result<(), TxScriptError> {
        Err(TxScriptError::NotATransactionInput)
    }

    fn check_sequence(&self, _sequence: i64) -> Result<(), TxScriptError> {
        Err(TxScriptError::NotATransactionInput)
    }
}

/// Binds one input of a populated transaction to the engine
pub struct TransactionChecker<'a, T: VerifiableTransaction> {
    tx: &'a T,
    input_index: usize,
    reused_values: &'a SigHashReusedValues,
    sig_cache: &'a Cache<SigCacheKey, bool>,
}

impl<'a, T: VerifiableTransaction> TransactionChecker<'a, T> {
    /// # Panics
    /// When `input_index` is not an input of `tx`
    pub fn new(tx: &'a T, input_index: usize, reused_values: &'a SigHashReusedValues, sig_cache: &'a Cache<SigCacheKey, bool>) -> Self {
        assert!(input_index < tx.inputs().len());
        Self { tx, input_index, reused_values, sig_cache }
    }

    fn input(&self) -> &TransactionInput {
        &self.tx.inputs()[self.input_index]
    }
}

impl<T: VerifiableTransaction> TxContext for TransactionChecker<'_, T> {
    fn input_index(&self) -> Option<usize> {
        Some(self.input_index)
    }

    fn active_bytecode(&self) -> Option<&[u8]> {
        self.tx.coin(self.input_index).map(|coin| coin.script())
    }

    fn signature_script(&self) -> Option<&[u8]> {
        Some(self.input().signature_script.as_slice())
    }

    fn tx_version(&self) -> Option<i32> {
        Some(self.tx.tx().version)
    }

    fn input_count(&self) -> Option<usize> {
        Some(self.tx.inputs().len())
    }

    fn output_count(&self) -> Option<usize> {
        Some(self.tx.outputs().len())
    }

    fn lock_time(&self) -> Option<u32> {
        Some(self.tx.tx().lock_time)
    }

    fn output(&self, index: usize) -> Option<&TransactionOutput> {
        self.tx.outputs().get(index)
    }

    fn spent_amount(&self) -> Option<i64> {
        self.tx.coin(self.input_index).map(|coin| coin.value())
    }

    fn check_sig(&self, sig_with_hashtype: &[u8], pubkey: &[u8], script_code: &[u8]) -> Result<bool, TxScriptError> {
        let Some((&typ, der)) = sig_with_hashtype.split_last() else {
            return Ok(false);
        };
        let hash_type = SigHashType::from_u8(typ).map_err(|_| TxScriptError::InvalidSigHashType(typ))?;
        let Ok(pub_key) = secp256k1::PublicKey::from_slice(pubkey) else {
            return Ok(false);
        };
        let Ok(mut signature) = Signature::from_der(der) else {
            return Ok(false);
        };
        // libsecp256k1 only verifies lower-S signatures
        signature.normalize_s();

        let sig_hash = calc_signature_hash(self.tx, self.input_index, script_code, hash_type, self.reused_values);
        let message = Message::from_digest(sig_hash.as_bytes());
        let sig_cache_key = SigCacheKey { signature, pub_key, message };

        match self.sig_cache.get(&sig_cache_key) {
            Some(valid) => Ok(valid),
            None => {
                let valid = SECP256K1.verify_ecdsa(&message, &signature, &pub_key).is_ok();
                self.sig_cache.insert(sig_cache_key, valid);
                Ok(valid)
            }
        }
    }

    fn check_lock_time(&self, lock_time: i64) -> Result<(), TxScriptError> {
        let tx_lock_time = self.tx.tx().lock_time as i64;
        let threshold = LOCK_TIME_THRESHOLD as i64;

        // Block heights and timestamps can't be compared
        if (tx_lock_time < threshold) != (lock_time < threshold) {
            return Err(TxScriptError::UnsatisfiedLockTime(format!(
                "mismatched locktime types -- tx locktime {tx_lock_time}, stack locktime {lock_time}"
            )));
        }

        if lock_time > tx_lock_time {
            return Err(TxScriptError::UnsatisfiedLockTime(format!(
                "locktime requirement not satisfied -- locktime is greater than the transaction locktime: {lock_time} > {tx_lock_time}"
            )));
        }

        // A finalized input disables the lock time of the whole transaction
        if self.input().sequence == MAX_TX_IN_SEQUENCE_NUM {
            return Err(TxScriptError::UnsatisfiedLockTime("transaction input is finalized".to_string()));
        }
        Ok(())
    }

    fn check_sequence(&self, sequence: i64) -> Result<(), TxScriptError> {
        let tx_sequence = self.input().sequence as i64;

        if self.tx.tx().version < 2 {
            return Err(TxScriptError::UnsatisfiedLockTime(format!(
                "transaction version {} does not support relative lock times",
                self.tx.tx().version
            )));
        }

        if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG as i64 != 0 {
            return Err(TxScriptError::UnsatisfiedLockTime(format!(
                "transaction sequence has sequence locktime disabled bit set: {tx_sequence:#x}"
            )));
        }

        let mask = (SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK) as i64;
        let type_flag = SEQUENCE_LOCKTIME_TYPE_FLAG as i64;
        let tx_sequence_masked = tx_sequence & mask;
        let sequence_masked = sequence & mask;

        if (tx_sequence_masked < type_flag) != (sequence_masked < type_flag) {
            return Err(TxScriptError::UnsatisfiedLockTime(format!(
                "mismatched sequence types -- tx sequence {tx_sequence_masked:#x}, stack sequence {sequence_masked:#x}"
            )));
        }

        if sequence_masked > tx_sequence_masked {
            return Err(TxScriptError::UnsatisfiedLockTime(format!(
                "sequence requirement not satisfied -- {sequence_masked:#x} > {tx_sequence_masked:#x}"
            )));
        }
        Ok(())
    }
}
