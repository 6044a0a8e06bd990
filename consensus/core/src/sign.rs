//! Pay-to-public-key-hash signing, used by wallets, tools and tests to produce spendable transactions.

use crate::{
    hashing::{
        sighash::{SigHashReusedValues, calc_signature_hash},
        sighash_type::SigHashType,
    },
    tx::{PopulatedTransaction, ScriptPublicKey, Transaction, VerifiableTransaction},
    utxo::Coin,
};
use lotus_hashes::hash160;
use secp256k1::{Keypair, Message, SECP256K1};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error("Secp256k1 -> {0}")]
    Secp256k1Error(#[from] secp256k1::Error),

    #[error("input {0} is not locked to the signing key")]
    ForeignInput(usize),
}

/// OP_DUP OP_HASH160 <pubkey_hash> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> ScriptPublicKey {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[0x76, 0xa9, 0x14]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[0x88, 0xac]);
    ScriptPublicKey::from_vec(script)
}

/// The P2PKH locking script of a key
pub fn p2pkh_script_for_key(keypair: &Keypair) -> ScriptPublicKey {
    p2pkh_script(&hash160(&keypair.public_key().serialize()))
}

/// Produces the DER signature of input `input_index` with the hash type byte appended
pub fn sign_input(
    tx: &impl VerifiableTransaction,
    input_index: usize,
    script_code: &[u8],
    keypair: &Keypair,
    hash_type: SigHashType,
    reused_values: &SigHashReusedValues,
) -> Vec<u8> {
    let sig_hash = calc_signature_hash(tx, input_index, script_code, hash_type, reused_values);
    let msg = Message::from_digest(sig_hash.as_bytes());
    let sig = SECP256K1.sign_ecdsa(&msg, &keypair.secret_key());
    let mut sig_bytes = sig.serialize_der().to_vec();
    sig_bytes.push(hash_type.to_u8());
    sig_bytes
}

/// Signs every input of `tx` spending `entries` (in input order) with `keypair`, filling
/// the P2PKH signature scripts. All inputs must be locked to the key.
pub fn sign(tx: &mut Transaction, entries: Vec<Coin>, keypair: &Keypair) -> Result<(), Error> {
    if tx.inputs.len() != entries.len() {
        return Err(Error::Message(format!("{} inputs but {} entries", tx.inputs.len(), entries.len())));
    }
    let script_public_key = p2pkh_script_for_key(keypair);
    if let Some(index) = entries.iter().position(|coin| coin.output.script_public_key != script_public_key) {
        return Err(Error::ForeignInput(index));
    }

    let pubkey = keypair.public_key().serialize();
    let signature_scripts = {
        let populated = PopulatedTransaction::new(tx, entries);
        let reused_values = SigHashReusedValues::new();
        (0..populated.tx.inputs.len())
            .map(|i| {
                let sig = sign_input(&populated, i, script_public_key.script(), keypair, SigHashType::all_forkid(), &reused_values);
                let mut script = Vec::with_capacity(sig.len() + pubkey.len() + 2);
                script.push(sig.len() as u8);
                script.extend_from_slice(&sig);
                script.push(pubkey.len() as u8);
                script.extend_from_slice(&pubkey);
                script
            })
            .collect::<Vec<_>>()
    };

    for (input, signature_script) in tx.inputs.iter_mut().zip(signature_scripts) {
        input.signature_script = signature_script;
    }
    tx.finalize();
    Ok(())
}
