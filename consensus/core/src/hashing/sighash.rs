use lotus_hashes::{Hash, Hasher, HasherBase, Sha256d, ZERO_HASH};
use std::sync::OnceLock;

use crate::tx::{TransactionOutput, VerifiableTransaction};

use super::{
    HasherExtensions,
    sighash_type::SigHashType,
    tx::{write_outpoint, write_output},
};

/// Per-transaction digests shared by the signature hashes of all its inputs. Each value is
/// computed at most once, and the struct is `Sync` so inputs can be verified in parallel.
#[derive(Default)]
pub struct SigHashReusedValues {
    previous_outputs_hash: OnceLock<Hash>,
    sequence_hash: OnceLock<Hash>,
    outputs_hash: OnceLock<Hash>,
}

impl SigHashReusedValues {
    pub fn new() -> Self {
        Self::default()
    }
}

fn previous_outputs_hash(tx: &impl VerifiableTransaction, hash_type: SigHashType, reused_values: &SigHashReusedValues) -> Hash {
    if hash_type.is_sighash_anyone_can_pay() {
        return ZERO_HASH;
    }

    *reused_values.previous_outputs_hash.get_or_init(|| {
        let mut hasher = Sha256d::new();
        for input in tx.inputs() {
            write_outpoint(&mut hasher, &input.previous_outpoint);
        }
        hasher.finalize()
    })
}

fn sequence_hash(tx: &impl VerifiableTransaction, hash_type: SigHashType, reused_values: &SigHashReusedValues) -> Hash {
    if hash_type.is_sighash_single() || hash_type.is_sighash_anyone_can_pay() || hash_type.is_sighash_none() {
        return ZERO_HASH;
    }

    *reused_values.sequence_hash.get_or_init(|| {
        let mut hasher = Sha256d::new();
        for input in tx.inputs() {
            hasher.write_u32(input.sequence);
        }
        hasher.finalize()
    })
}

fn outputs_hash(tx: &impl VerifiableTransaction, hash_type: SigHashType, reused_values: &SigHashReusedValues, input_index: usize) -> Hash {
    if hash_type.is_sighash_single() {
        // If the relevant output exists - return its hash, otherwise return zero-hash
        return match tx.outputs().get(input_index) {
            Some(output) => hash_outputs(std::iter::once(output)),
            None => ZERO_HASH,
        };
    }

    if hash_type.is_sighash_none() {
        return ZERO_HASH;
    }

    // Otherwise, return hash of all outputs. Re-use hash if available.
    *reused_values.outputs_hash.get_or_init(|| hash_outputs(tx.outputs().iter()))
}

fn hash_outputs<'a>(outputs: impl Iterator<Item = &'a TransactionOutput>) -> Hash {
    let mut hasher = Sha256d::new();
    for output in outputs {
        write_output(&mut hasher, output);
    }
    hasher.finalize()
}

/// Computes the replay protected signature hash of input `input_index` (the BIP143 digest
/// extended with the fork id bit of the hash type).
///
/// `script_code` is the part of the executed locking script following the last executed
/// OP_CODESEPARATOR.
pub fn calc_signature_hash(
    tx: &impl VerifiableTransaction,
    input_index: usize,
    script_code: &[u8],
    hash_type: SigHashType,
    reused_values: &SigHashReusedValues,
) -> Hash {
    let (input, coin) = tx.populated_input(input_index);
    let mut hasher = Sha256d::new();
    hasher
        .write_i32(tx.tx().version)
        .update(previous_outputs_hash(tx, hash_type, reused_values))
        .update(sequence_hash(tx, hash_type, reused_values));
    write_outpoint(&mut hasher, &input.previous_outpoint);
    hasher
        .write_var_bytes(script_code)
        .write_i64(coin.output.value)
        .write_u32(input.sequence)
        .update(outputs_hash(tx, hash_type, reused_values, input_index))
        .write_u32(tx.tx().lock_time)
        .write_u32(hash_type.to_u8() as u32);
    hasher.finalize()
}
