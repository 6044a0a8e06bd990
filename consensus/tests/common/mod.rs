use std::sync::Arc;

use lotus_consensus::{chain_state::ChainState, errors::BlockProcessResult};
use lotus_consensus_core::{
    block::Block,
    config::{Config, params::REGTEST_PARAMS},
    constants::COINBASE_MATURITY,
    hashing::{sighash::SigHashReusedValues, sighash_type::SigHashType},
    sign::{p2pkh_script, sign_input},
    tx::{PopulatedTransaction, ScriptPublicKey, Transaction, TransactionInput, TransactionOutpoint, TransactionOutput},
    utxo::{Coin, MemoryCoinsView},
};
use lotus_hashes::{Hash, hash160};
use lotus_txscript::{covenants::extract_covenant, standard::pay_to_pub_key_hash_signature_script};
use secp256k1::{Keypair, SECP256K1};

/// A regtest chain funding a single key, with helpers to mine blocks on top of it
#[allow(dead_code)] // Not every test binary uses every helper
pub struct TestChain {
    pub chain: ChainState<MemoryCoinsView>,
    pub keypair: Keypair,
    pub height: u32,
    blocks: u64,
}

#[allow(dead_code)]
impl TestChain {
    /// Mines a coinbase paying `funding` to the chain's key and advances to the height at
    /// which it can be spent. Returns the funded outpoints.
    pub fn new(funding: &[i64]) -> (Self, Vec<TransactionOutpoint>) {
        Self::with_config(Config::new(REGTEST_PARAMS), funding)
    }

    pub fn with_config(config: Config, funding: &[i64]) -> (Self, Vec<TransactionOutpoint>) {
        let keypair = Keypair::from_seckey_slice(SECP256K1, &[0x42; 32]).unwrap();
        let mut test_chain = Self { chain: ChainState::new(Arc::new(config), MemoryCoinsView::new()), keypair, height: 0, blocks: 0 };

        let spk = test_chain.p2pkh();
        let outputs = funding.iter().map(|value| TransactionOutput::new(*value, spk.clone())).collect();
        let coinbase = coinbase(0, outputs);
        let outpoints = (0..funding.len() as u32).map(|index| coinbase.outpoint(index)).collect();
        test_chain.connect(vec![coinbase]).unwrap();
        test_chain.height = COINBASE_MATURITY;
        (test_chain, outpoints)
    }

    pub fn owner_hash(&self) -> [u8; 20] {
        hash160(&self.keypair.public_key().serialize())
    }

    pub fn p2pkh(&self) -> ScriptPublicKey {
        p2pkh_script(&self.owner_hash())
    }

    pub fn coin(&self, outpoint: &TransactionOutpoint) -> Coin {
        self.chain.coin(outpoint).unwrap()
    }

    /// Mines a block holding a fresh coinbase followed by `txs`
    pub fn mine(&mut self, txs: Vec<Transaction>) -> BlockProcessResult<i64> {
        let coinbase = coinbase(self.height, vec![TransactionOutput::new(50_000, self.p2pkh())]);
        self.connect([vec![coinbase], txs].concat())
    }

    fn connect(&mut self, transactions: Vec<Transaction>) -> BlockProcessResult<i64> {
        let block = Block::new(Hash::from_u64_word(self.blocks + 1), self.chain.best_block(), transactions);
        let fees = self.chain.connect_block(&block, self.height, false)?;
        self.blocks += 1;
        self.height += 1;
        Ok(fees)
    }

    /// Builds a transaction spending `outpoints` to `outputs`. Inputs locked to the chain's key,
    /// directly or through a simple covenant, are signed. Other inputs get an empty
    /// signature script.
    pub fn spend(&self, outpoints: &[TransactionOutpoint], outputs: Vec<TransactionOutput>) -> Transaction {
        let inputs = outpoints.iter().map(|outpoint| TransactionInput::new(*outpoint, vec![], u32::MAX)).collect();
        let mut tx = Transaction::new(2, inputs, outputs, 0);
        let coins: Vec<Coin> = outpoints.iter().map(|outpoint| self.coin(outpoint)).collect();

        let pubkey = self.keypair.public_key().serialize();
        let signature_scripts: Vec<Vec<u8>> = {
            let populated = PopulatedTransaction::new(&tx, coins.clone());
            let reused_values = SigHashReusedValues::new();
            coins
                .iter()
                .enumerate()
                .map(|(index, coin)| {
                    let script = coin.script();
                    let owned = script == self.p2pkh().script()
                        || extract_covenant(script).is_some_and(|covenant| !covenant.is_self_validating());
                    if !owned {
                        return vec![];
                    }
                    let sig = sign_input(&populated, index, script, &self.keypair, SigHashType::all_forkid(), &reused_values);
                    pay_to_pub_key_hash_signature_script(&sig, &pubkey).unwrap()
                })
                .collect()
        };
        for (input, signature_script) in tx.inputs.iter_mut().zip(signature_scripts) {
            input.signature_script = signature_script;
        }
        tx.finalize();
        tx
    }
}

pub fn coinbase(height: u32, outputs: Vec<TransactionOutput>) -> Transaction {
    let mut script = height.to_le_bytes().to_vec();
    script.resize(24, 0);
    Transaction::new(2, vec![TransactionInput::new(TransactionOutpoint::null(), script, u32::MAX)], outputs, 0)
}
