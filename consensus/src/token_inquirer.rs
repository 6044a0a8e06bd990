//! Read-only queries over covenant token outputs, backing the token RPC commands.
//!
//! Only simple covenants report token data: a complex covenant carries no balance or owner
//! the node could read. Identifiers are rendered as reversed hex, like every other hash the
//! node prints.

use lotus_addresses::{Address, Network};
use lotus_consensus_core::{
    tx::{Transaction, TransactionId, TransactionOutpoint},
    utxo::{CoinsView, CoinsViewCache},
};
use lotus_hashes::Hash;
use lotus_txscript::covenants::{CovenantScript, CovenantTokenData, extract_covenant};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub valid: bool,
    #[serde(rename = "genesisid", skip_serializing_if = "Option::is_none")]
    pub genesis_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    #[serde(rename = "ownerpubkeyhash", skip_serializing_if = "Option::is_none")]
    pub owner_pubkey_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOutputInfo {
    pub vout: u32,
    #[serde(rename = "genesisid")]
    pub genesis_id: String,
    pub balance: i64,
    #[serde(rename = "ownerpubkeyhash")]
    pub owner_pubkey_hash: String,
    pub owner: String,
}

fn reversed_hex(bytes: &[u8]) -> String {
    let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
    faster_hex::hex_string(&reversed)
}

fn simple_token(script: &[u8]) -> Option<CovenantTokenData> {
    match extract_covenant(script)? {
        CovenantScript::Simple(data) => Some(data),
        CovenantScript::Complex { .. } => None,
    }
}

impl TokenOutputInfo {
    fn new(vout: u32, data: &CovenantTokenData, network: Network) -> Self {
        Self {
            vout,
            genesis_id: Hash::from_bytes(data.genesis_id).to_string(),
            balance: data.balance,
            owner_pubkey_hash: reversed_hex(&data.owner_hash),
            owner: Address::from_pubkey_hash(network, &data.owner_hash).encode(),
        }
    }
}

impl From<TokenOutputInfo> for TokenInfo {
    fn from(info: TokenOutputInfo) -> Self {
        Self {
            valid: true,
            genesis_id: Some(info.genesis_id),
            balance: Some(info.balance),
            owner_pubkey_hash: Some(info.owner_pubkey_hash),
            owner: Some(info.owner),
        }
    }
}

/// Token data of the unspent output `index` of `txid`. Spent, missing and non-token outputs
/// are reported as not valid.
pub fn token_info<V: CoinsView>(coins: &mut CoinsViewCache<V>, txid: TransactionId, index: u32, network: Network) -> TokenInfo {
    coins
        .access_coin(&TransactionOutpoint::new(txid, index))
        .and_then(|coin| simple_token(coin.script()))
        .map(|data| TokenOutputInfo::new(index, &data, network).into())
        .unwrap_or_default()
}

/// Token data of every simple covenant output of `tx`
pub fn scan_tokens(tx: &Transaction, network: Network) -> Vec<TokenOutputInfo> {
    tx.outputs
        .iter()
        .enumerate()
        .filter_map(|(vout, output)| {
            simple_token(output.script_public_key.script()).map(|data| TokenOutputInfo::new(vout as u32, &data, network))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotus_consensus_core::{
        tx::{ScriptPublicKey, TransactionInput, TransactionOutput},
        utxo::MemoryCoinsView,
    };

    fn token_tx() -> Transaction {
        let mut genesis = [0u8; 32];
        genesis[0] = 0x01;
        genesis[31] = 0xff;
        let mut owner = [0u8; 20];
        owner[0] = 0xaa;
        let complex = [[0x20].as_slice(), &[0x07; 32], &[0x75, 0xc4, 0x51, 0x87]].concat();
        Transaction::new(
            2,
            vec![TransactionInput::new(TransactionOutpoint::new(1.into(), 0), vec![], u32::MAX)],
            vec![
                TransactionOutput::new(546, ScriptPublicKey::from_vec(vec![0x51])),
                TransactionOutput::new(546, CovenantTokenData::new(genesis, 1 << 40, owner).to_script()),
                TransactionOutput::new(546, ScriptPublicKey::from_vec(complex)),
            ],
            0,
        )
    }

    #[test]
    fn test_scan_tokens() {
        let tokens = scan_tokens(&token_tx(), Network::Mainnet);
        assert_eq!(tokens.len(), 1);
        let token = &tokens[0];
        assert_eq!(token.vout, 1);
        assert_eq!(token.balance, 1 << 40);
        assert!(token.genesis_id.starts_with("ff"));
        assert!(token.genesis_id.ends_with("01"));
        assert_eq!(token.owner_pubkey_hash, format!("{}aa", "00".repeat(19)));
        let owner: Address = token.owner.parse().unwrap();
        assert_eq!(owner, Address::from_pubkey_hash(Network::Mainnet, &{
            let mut owner = [0u8; 20];
            owner[0] = 0xaa;
            owner
        }));
    }

    #[test]
    fn test_token_info() {
        let tx = token_tx();
        let mut coins = CoinsViewCache::new(MemoryCoinsView::new(), usize::MAX);
        coins.add_coins(&tx, 10, false);

        let info = token_info(&mut coins, tx.id(), 1, Network::Testnet);
        assert!(info.valid);
        assert_eq!(info.balance, Some(1 << 40));
        assert!(info.owner.as_deref().is_some_and(|owner| owner.starts_with("lotusT")));

        for index in [0, 2, 3] {
            assert_eq!(token_info(&mut coins, tx.id(), index, Network::Testnet), TokenInfo::default());
        }

        coins.spend(&tx.outpoint(1));
        assert!(!token_info(&mut coins, tx.id(), 1, Network::Testnet).valid);
    }

    #[test]
    fn test_json_projection() {
        let json = serde_json::to_value(TokenInfo::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "valid": false }));

        let info: TokenInfo = scan_tokens(&token_tx(), Network::Regtest).remove(0).into();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["balance"], 1i64 << 40);
        assert!(json["genesisid"].is_string());
        assert!(json["ownerpubkeyhash"].is_string());
        assert_eq!(serde_json::from_value::<TokenInfo>(json).unwrap(), info);
    }
}
