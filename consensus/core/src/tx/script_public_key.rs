use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::str::{self, FromStr};

use crate::constants::MAX_SCRIPT_SIZE;

/// Size of the underlying script vector of a script.
pub const SCRIPT_VECTOR_SIZE: usize = 36;

/// Used as the underlying type for script public key data, optimized for the common p2pkh script size (25).
pub type ScriptVec = SmallVec<[u8; SCRIPT_VECTOR_SIZE]>;

/// Alias the `smallvec!` macro to ease maintenance
pub use smallvec::smallvec as scriptvec;

const OP_RETURN: u8 = 0x6a;

/// The locking script of a transaction output
#[derive(Default, PartialEq, Eq, Clone, Hash)]
pub struct ScriptPublicKey {
    pub(super) script: ScriptVec, // Kept private to preserve read-only semantics
}

impl std::fmt::Debug for ScriptPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptPublicKey").field("script", &faster_hex::hex_string(&self.script)).finish()
    }
}

impl ScriptPublicKey {
    pub fn new(script: ScriptVec) -> Self {
        Self { script }
    }

    pub fn from_vec(script: Vec<u8>) -> Self {
        Self { script: ScriptVec::from_vec(script) }
    }

    pub fn script(&self) -> &[u8] {
        &self.script
    }

    /// Scripts that can never be satisfied: data carriers starting with OP_RETURN and
    /// scripts above the executable size limit.
    pub fn is_unspendable(&self) -> bool {
        self.script.first() == Some(&OP_RETURN) || self.script.len() > MAX_SCRIPT_SIZE
    }

    /// Heap bytes used by the script, zero while it fits inline
    pub fn heap_size(&self) -> usize {
        if self.script.spilled() { self.script.capacity() } else { 0 }
    }
}

impl FromStr for ScriptPublicKey {
    type Err = faster_hex::Error;

    fn from_str(hex_str: &str) -> Result<Self, Self::Err> {
        let hex_len = hex_str.len();
        if hex_len % 2 != 0 {
            return Err(faster_hex::Error::InvalidLength(hex_len));
        }
        let mut bytes = vec![0u8; hex_len / 2];
        faster_hex::hex_decode(hex_str.as_bytes(), bytes.as_mut_slice())?;
        Ok(Self::from_vec(bytes))
    }
}

impl Serialize for ScriptPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&faster_hex::hex_string(&self.script))
        } else {
            serializer.serialize_bytes(&self.script)
        }
    }
}

impl<'de> Deserialize<'de> for ScriptPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = <String as Deserialize>::deserialize(deserializer)?;
            ScriptPublicKey::from_str(&s).map_err(serde::de::Error::custom)
        } else {
            <Vec<u8> as Deserialize>::deserialize(deserializer).map(ScriptPublicKey::from_vec)
        }
    }
}

//
// Borsh serializers need to be manually implemented for `ScriptPublicKey` since
// smallvec does not currently support Borsh
//
impl BorshSerialize for ScriptPublicKey {
    fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        // Vectors and slices are all serialized internally the same way
        borsh::BorshSerialize::serialize(&self.script.as_slice(), writer)
    }
}

impl BorshDeserialize for ScriptPublicKey {
    fn deserialize_reader<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        // Deserialize into vec first since we have no custom smallvec support
        Ok(Self::from_vec(borsh::BorshDeserialize::deserialize_reader(reader)?))
    }
}
