//! Recognition and decoding of covenant token outputs.
//!
//! A *simple* covenant is a fixed 91-byte template carrying a token identity, a balance and an
//! owner, followed by a P2PKH spend condition for that owner:
//!
//! ```text
//! <32: genesis> OP_DROP <8: balance, big-endian> OP_DROP <20: owner> OP_DROP
//! OP_DUP OP_HASH160 <20: owner> OP_EQUALVERIFY OP_CHECKSIG
//! ```
//!
//! A *complex* covenant starts with the same 32-byte identity push and enforces its own rules
//! through transaction introspection, so its balance is never summed by consensus.

use crate::opcodes::codes::{
    OpCat, OpCheckSig, OpData8, OpData20, OpData32, OpDrop, OpDup, OpEqualVerify, OpHash160, OpInputIndex, OpOutputBytecode,
};
use lotus_consensus_core::tx::ScriptPublicKey;
use serde::{Deserialize, Serialize};
use std::ops::{Range, RangeInclusive};

pub const SIMPLE_COVENANT_LEN: usize = 91;

/// Shortest script that can carry the identity push
pub const MIN_COVENANT_LEN: usize = 33;

const GENESIS_RANGE: Range<usize> = 1..33;
const BALANCE_RANGE: Range<usize> = 35..43;
const OWNER_RANGE: Range<usize> = 45..65;

const SIMPLE_TEMPLATE_BYTES: [(usize, u8); 11] = [
    (0, OpData32),
    (33, OpDrop),
    (34, OpData8),
    (43, OpDrop),
    (44, OpData20),
    (65, OpDrop),
    (66, OpDup),
    (67, OpHash160),
    (68, OpData20),
    (89, OpEqualVerify),
    (90, OpCheckSig),
];

const INTROSPECTION_OPCODES: RangeInclusive<u8> = OpInputIndex..=OpOutputBytecode;

/// Token data carried by a simple covenant output
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CovenantTokenData {
    pub genesis_id: [u8; 32],
    pub balance: i64,
    pub owner_hash: [u8; 20],
}

impl CovenantTokenData {
    pub fn new(genesis_id: [u8; 32], balance: i64, owner_hash: [u8; 20]) -> Self {
        Self { genesis_id, balance, owner_hash }
    }

    /// Builds the simple covenant locking script carrying this data
    pub fn to_script(&self) -> ScriptPublicKey {
        let mut script = Vec::with_capacity(SIMPLE_COVENANT_LEN);
        script.push(OpData32);
        script.extend_from_slice(&self.genesis_id);
        script.extend_from_slice(&[OpDrop, OpData8]);
        script.extend_from_slice(&self.balance.to_be_bytes());
        script.extend_from_slice(&[OpDrop, OpData20]);
        script.extend_from_slice(&self.owner_hash);
        script.extend_from_slice(&[OpDrop, OpDup, OpHash160, OpData20]);
        script.extend_from_slice(&self.owner_hash);
        script.extend_from_slice(&[OpEqualVerify, OpCheckSig]);
        ScriptPublicKey::from_vec(script)
    }
}

/// A recognized covenant output
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CovenantScript {
    Simple(CovenantTokenData),
    Complex { genesis_id: [u8; 32] },
}

impl CovenantScript {
    pub fn genesis_id(&self) -> [u8; 32] {
        match self {
            CovenantScript::Simple(data) => data.genesis_id,
            CovenantScript::Complex { genesis_id } => *genesis_id,
        }
    }

    /// Complex covenants validate their own balance rules in script
    pub fn is_self_validating(&self) -> bool {
        matches!(self, CovenantScript::Complex { .. })
    }
}

pub fn is_simple_covenant(script: &[u8]) -> bool {
    script.len() == SIMPLE_COVENANT_LEN
        && SIMPLE_TEMPLATE_BYTES.iter().all(|&(offset, byte)| script[offset] == byte)
}

/// A script opening with a 32-byte push and containing an introspection opcode or OP_CAT
/// after it. Bytes are matched raw, so a push payload holding such a byte also qualifies.
pub fn is_complex_covenant(script: &[u8]) -> bool {
    script.len() >= MIN_COVENANT_LEN
        && script[0] == OpData32
        && script[MIN_COVENANT_LEN..].iter().any(|byte| INTROSPECTION_OPCODES.contains(byte) || *byte == OpCat)
        && !is_simple_covenant(script)
}

pub fn is_covenant_script(script: &[u8]) -> bool {
    is_simple_covenant(script) || is_complex_covenant(script)
}

pub fn extract_covenant_genesis(script: &[u8]) -> Option<[u8; 32]> {
    if !is_covenant_script(script) {
        return None;
    }
    script[GENESIS_RANGE].try_into().ok()
}

/// Balance of a simple covenant, zero for anything else
pub fn extract_covenant_balance(script: &[u8]) -> i64 {
    if !is_simple_covenant(script) {
        return 0;
    }
    script[BALANCE_RANGE].try_into().map(i64::from_be_bytes).unwrap_or_default()
}

pub fn extract_covenant(script: &[u8]) -> Option<CovenantScript> {
    if is_simple_covenant(script) {
        let genesis_id = script[GENESIS_RANGE].try_into().ok()?;
        let owner_hash = script[OWNER_RANGE].try_into().ok()?;
        Some(CovenantScript::Simple(CovenantTokenData::new(genesis_id, extract_covenant_balance(script), owner_hash)))
    } else if is_complex_covenant(script) {
        Some(CovenantScript::Complex { genesis_id: script[GENESIS_RANGE].try_into().ok()? })
    } else {
        None
    }
}
