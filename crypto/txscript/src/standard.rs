use crate::{
    opcodes::codes::{OpCheckSig, OpData20, OpDup, OpEqualVerify, OpHash160},
    script_builder::{ScriptBuilder, ScriptBuilderResult},
};
use lotus_addresses::{Address, AddressType, Network};
use lotus_consensus_core::tx::ScriptPublicKey;
use thiserror::Error;

/// Length of a pay-to-public-key-hash locking script
pub const P2PKH_SCRIPT_LEN: usize = 25;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StandardError {
    #[error("addresses of type {0:?} cannot be paid to with a locking script")]
    UnsupportedAddressType(AddressType),
}

/// Whether `script` is exactly `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
pub fn is_pay_to_pub_key_hash(script: &[u8]) -> bool {
    script.len() == P2PKH_SCRIPT_LEN
        && script[..3] == [OpDup, OpHash160, OpData20]
        && script[23] == OpEqualVerify
        && script[24] == OpCheckSig
}

pub fn extract_pub_key_hash(script: &[u8]) -> Option<[u8; 20]> {
    if !is_pay_to_pub_key_hash(script) {
        return None;
    }
    script[3..23].try_into().ok()
}

/// Creates a new script to pay a transaction output to a public key hash.
pub fn pay_to_pub_key_hash(pubkey_hash: &[u8; 20]) -> ScriptBuilderResult<ScriptPublicKey> {
    let script =
        ScriptBuilder::new().add_ops(&[OpDup, OpHash160])?.add_data(pubkey_hash)?.add_ops(&[OpEqualVerify, OpCheckSig])?.drain();
    Ok(ScriptPublicKey::from_vec(script))
}

/// Generates the unlocking script of a pay-to-public-key-hash output
pub fn pay_to_pub_key_hash_signature_script(signature: &[u8], pubkey: &[u8]) -> ScriptBuilderResult<Vec<u8>> {
    Ok(ScriptBuilder::new().add_data(signature)?.add_data(pubkey)?.drain())
}

/// Creates the locking script the address designates.
pub fn pay_to_address_script(address: &Address) -> Result<ScriptPublicKey, StandardError> {
    match address.address_type {
        AddressType::ScriptPubKey => Ok(ScriptPublicKey::from_vec(address.payload.clone())),
        AddressType::Taproot => Err(StandardError::UnsupportedAddressType(address.address_type)),
    }
}

/// Returns the address of a locking script. Every script has one, since the address
/// carries the script itself.
pub fn extract_script_pub_key_address(script_public_key: &ScriptPublicKey, network: Network) -> Address {
    match extract_pub_key_hash(script_public_key.script()) {
        Some(hash) => Address::from_pubkey_hash(network, &hash),
        None => Address::new(network, AddressType::ScriptPubKey, script_public_key.script()),
    }
}
