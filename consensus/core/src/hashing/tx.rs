use super::{BytesWriter, HasherExtensions, SizeCounter};
use crate::tx::{Transaction, TransactionId, TransactionInput, TransactionOutpoint, TransactionOutput};
use lotus_hashes::{Hasher, HasherBase, Sha256d};

/// Not intended for direct use by clients. Instead use `tx.id()`
pub fn id(tx: &Transaction) -> TransactionId {
    let mut hasher = Sha256d::new();
    write_transaction(&mut hasher, tx);
    hasher.finalize()
}

/// Returns the wire serialization of the transaction
pub fn serialize(tx: &Transaction) -> Vec<u8> {
    let mut writer = BytesWriter::default();
    write_transaction(&mut writer, tx);
    writer.0
}

pub fn serialized_size(tx: &Transaction) -> usize {
    let mut counter = SizeCounter::default();
    write_transaction(&mut counter, tx);
    counter.0
}

/// Write the transaction into the provided hasher
fn write_transaction<T: HasherBase>(hasher: &mut T, tx: &Transaction) {
    hasher.write_i32(tx.version).write_len(tx.inputs.len());
    for input in tx.inputs.iter() {
        write_input(hasher, input);
    }

    hasher.write_len(tx.outputs.len());
    for output in tx.outputs.iter() {
        write_output(hasher, output);
    }

    hasher.write_u32(tx.lock_time);
}

#[inline(always)]
fn write_input<T: HasherBase>(hasher: &mut T, input: &TransactionInput) {
    write_outpoint(hasher, &input.previous_outpoint);
    hasher.write_var_bytes(input.signature_script.as_slice()).write_u32(input.sequence);
}

#[inline(always)]
pub(crate) fn write_outpoint<T: HasherBase>(hasher: &mut T, outpoint: &TransactionOutpoint) {
    hasher.update(outpoint.transaction_id).write_u32(outpoint.index);
}

#[inline(always)]
pub(crate) fn write_output<T: HasherBase>(hasher: &mut T, output: &TransactionOutput) {
    hasher.write_i64(output.value).write_var_bytes(output.script_public_key.script());
}
