//! Conservation of covenant token balances.
//!
//! From the activation height on, the balances carried by simple covenant outputs of every
//! token must add up to the balances spent from that token's inputs. Tokens with a complex
//! covenant on either side are left to their scripts. A transaction spending no balance of a
//! token creates it, which is how tokens are issued.

use std::collections::BTreeMap;

use lotus_consensus_core::{
    BlockHeight,
    errors::tx::{TxResult, TxRuleError},
    tx::Transaction,
    utxo::{CoinsView, CoinsViewCache},
};
use lotus_core::debug;
use lotus_hashes::Hash;
use lotus_txscript::covenants::{CovenantScript, extract_covenant};

use super::TransactionValidator;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
struct TokenFlow {
    input: i128,
    output: i128,
    self_validating: bool,
}

impl TokenFlow {
    fn record(&mut self, covenant: &CovenantScript, spent: bool) {
        match covenant {
            CovenantScript::Simple(data) if spent => self.input += data.balance as i128,
            CovenantScript::Simple(data) => self.output += data.balance as i128,
            CovenantScript::Complex { .. } => self.self_validating = true,
        }
    }
}

impl TransactionValidator {
    /// Checks that `tx`, included at `height`, conserves the balance of every covenant token it
    /// touches. Spent coins are looked up in `coins`. Inputs it does not hold are skipped, their
    /// absence is reported by the input checks.
    pub fn check_covenant_rules<V: CoinsView>(
        &self,
        tx: &Transaction,
        coins: &mut CoinsViewCache<V>,
        height: BlockHeight,
    ) -> TxResult<()> {
        if !self.params.covenants_active(height) {
            return Ok(());
        }

        let mut flows: BTreeMap<[u8; 32], TokenFlow> = BTreeMap::new();
        for input in tx.inputs.iter() {
            let Some(coin) = coins.access_coin(&input.previous_outpoint) else {
                continue;
            };
            if let Some(covenant) = extract_covenant(coin.script()) {
                flows.entry(covenant.genesis_id()).or_default().record(&covenant, true);
            }
        }
        for output in tx.outputs.iter() {
            if let Some(covenant) = extract_covenant(output.script_public_key.script()) {
                flows.entry(covenant.genesis_id()).or_default().record(&covenant, false);
            }
        }

        for (genesis, flow) in flows {
            if flow.self_validating || flow.input == 0 {
                continue;
            }
            if flow.input != flow.output {
                let genesis = Hash::from_bytes(genesis);
                debug!("transaction {} breaks the balance of token {}: {} in, {} out", tx.id(), genesis, flow.input, flow.output);
                return Err(TxRuleError::CovenantBalanceNotConserved { genesis, input: flow.input, output: flow.output });
            }
        }
        Ok(())
    }
}
