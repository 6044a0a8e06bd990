mod script_public_key;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::{hashing, utxo::Coin};

pub use script_public_key::{SCRIPT_VECTOR_SIZE, ScriptPublicKey, ScriptVec, scriptvec};

/// Represents the ID of a Lotus transaction
pub type TransactionId = lotus_hashes::Hash;

/// Represents a Lotus transaction outpoint
#[derive(Eq, Hash, PartialEq, Debug, Copy, Clone, Serialize, Deserialize, BorshSerialize, BorshDeserialize, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutpoint {
    pub transaction_id: TransactionId,
    pub index: u32,
}

impl TransactionOutpoint {
    pub fn new(transaction_id: TransactionId, index: u32) -> Self {
        Self { transaction_id, index }
    }

    /// The outpoint referenced by the single input of a coinbase transaction
    pub fn null() -> Self {
        Self { transaction_id: lotus_hashes::ZERO_HASH, index: u32::MAX }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.transaction_id.is_zero()
    }
}

impl Display for TransactionOutpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.transaction_id, self.index)
    }
}

/// Represents a Lotus transaction input
#[derive(Debug, Serialize, Deserialize, BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub previous_outpoint: TransactionOutpoint,
    #[serde(with = "serde_bytes_hex")]
    pub signature_script: Vec<u8>,
    pub sequence: u32,
}

impl TransactionInput {
    pub fn new(previous_outpoint: TransactionOutpoint, signature_script: Vec<u8>, sequence: u32) -> Self {
        Self { previous_outpoint, signature_script, sequence }
    }
}

/// Represents a Lotus transaction output
#[derive(Debug, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutput {
    pub value: i64,
    pub script_public_key: ScriptPublicKey,
}

impl TransactionOutput {
    pub fn new(value: i64, script_public_key: ScriptPublicKey) -> Self {
        Self { value, script_public_key }
    }
}

/// Represents a Lotus transaction
#[derive(Debug, Serialize, Deserialize, BorshSerialize, BorshDeserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,

    // A field that is used to cache the transaction ID.
    // Always use the corresponding self.id() instead of accessing this field directly
    id: TransactionId,
}

impl Transaction {
    pub fn new(version: i32, inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>, lock_time: u32) -> Self {
        let mut tx = Self { version, inputs, outputs, lock_time, id: Default::default() };
        tx.finalize();
        tx
    }

    /// A coinbase transaction has a single input spending the null outpoint
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_outpoint.is_null()
    }

    /// Recompute and finalize the tx id based on updated tx fields
    pub fn finalize(&mut self) {
        self.id = hashing::tx::id(self);
    }

    /// Returns the transaction ID
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Size of the transaction in its wire serialization
    pub fn serialized_size(&self) -> usize {
        hashing::tx::serialized_size(self)
    }

    /// Outpoint of the output at `index` of this transaction
    pub fn outpoint(&self, index: u32) -> TransactionOutpoint {
        TransactionOutpoint::new(self.id, index)
    }
}

/// Represents any kind of transaction which has populated coin entry data and can be verified/signed etc
pub trait VerifiableTransaction {
    fn tx(&self) -> &Transaction;

    /// Returns the `i`'th populated input
    fn populated_input(&self, index: usize) -> (&TransactionInput, &Coin);

    /// Returns an iterator over populated `(input, entry)` pairs
    fn populated_inputs(&self) -> PopulatedInputIterator<'_, Self>
    where
        Self: Sized,
    {
        PopulatedInputIterator::new(self)
    }

    fn inputs(&self) -> &[TransactionInput] {
        &self.tx().inputs
    }

    fn outputs(&self) -> &[TransactionOutput] {
        &self.tx().outputs
    }

    fn is_coinbase(&self) -> bool {
        self.tx().is_coinbase()
    }

    fn id(&self) -> TransactionId {
        self.tx().id()
    }

    fn coin(&self, index: usize) -> Option<&Coin>;
}

/// A custom iterator written only so that `populated_inputs` has a known return type and can de defined on the trait level
pub struct PopulatedInputIterator<'a, T: VerifiableTransaction> {
    tx: &'a T,
    r: std::ops::Range<usize>,
}

impl<'a, T: VerifiableTransaction> PopulatedInputIterator<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx, r: (0..tx.inputs().len()) }
    }
}

impl<'a, T: VerifiableTransaction> Iterator for PopulatedInputIterator<'a, T> {
    type Item = (&'a TransactionInput, &'a Coin);

    fn next(&mut self) -> Option<Self::Item> {
        self.r.next().map(|i| self.tx.populated_input(i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.r.size_hint()
    }
}

impl<T: VerifiableTransaction> ExactSizeIterator for PopulatedInputIterator<'_, T> {}

/// Represents a read-only referenced transaction along with fully populated coin entry data
pub struct PopulatedTransaction<'a> {
    pub tx: &'a Transaction,
    pub entries: Vec<Coin>,
}

impl<'a> PopulatedTransaction<'a> {
    pub fn new(tx: &'a Transaction, entries: Vec<Coin>) -> Self {
        assert_eq!(tx.inputs.len(), entries.len());
        Self { tx, entries }
    }
}

impl VerifiableTransaction for PopulatedTransaction<'_> {
    fn tx(&self) -> &Transaction {
        self.tx
    }

    fn populated_input(&self, index: usize) -> (&TransactionInput, &Coin) {
        (&self.tx.inputs[index], &self.entries[index])
    }

    fn coin(&self, index: usize) -> Option<&Coin> {
        self.entries.get(index)
    }
}

/// Hex serialization of byte vectors for human readable formats
mod serde_bytes_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&faster_hex::hex_string(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            let s = <String as Deserialize>::deserialize(deserializer)?;
            let mut bytes = vec![0u8; s.len() / 2];
            faster_hex::hex_decode(s.as_bytes(), &mut bytes).map_err(serde::de::Error::custom)?;
            Ok(bytes)
        } else {
            <Vec<u8> as Deserialize>::deserialize(deserializer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_transaction() -> Transaction {
        let input = TransactionInput::new(TransactionOutpoint::new(7.into(), 1), vec![0x51, 0x52], 0xfffffffe);
        let output = TransactionOutput::new(1_500, ScriptPublicKey::from_vec(vec![0x51]));
        Transaction::new(2, vec![input], vec![output], 17)
    }

    #[test]
    fn test_coinbase_detection() {
        let coinbase = Transaction::new(
            1,
            vec![TransactionInput::new(TransactionOutpoint::null(), vec![0x01, 0x02], u32::MAX)],
            vec![TransactionOutput::new(50, ScriptPublicKey::from_vec(vec![0x51]))],
            0,
        );
        assert!(coinbase.is_coinbase());
        assert!(!test_transaction().is_coinbase());
    }

    #[test]
    fn test_id_follows_content() {
        let mut tx = test_transaction();
        let id = tx.id();
        assert_eq!(id, test_transaction().id());
        tx.lock_time += 1;
        tx.finalize();
        assert_ne!(tx.id(), id);
        assert_eq!(tx.outpoint(3), TransactionOutpoint::new(tx.id(), 3));
    }

    #[test]
    fn test_serde_round_trip() {
        let tx = test_transaction();
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("\"signatureScript\":\"5152\""));
        let decoded: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, tx);

        let bytes = borsh::to_vec(&tx).unwrap();
        assert_eq!(Transaction::try_from_slice(&bytes).unwrap(), tx);
    }
}
