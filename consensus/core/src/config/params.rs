use serde::{Deserialize, Serialize};

use crate::{
    BlockHeight,
    constants::{COINBASE_MATURITY, MAX_MONEY, MAX_TX_SIGCHECKS},
    network::NetworkType,
};

use super::constants::MAINNET_COVENANT_ACTIVATION_HEIGHT;

/// Consensus parameters. Contains settings and configurations which are consensus-sensitive.
/// Changing one of these on a network node would exclude and prevent it from reaching consensus
/// with the other unmodified nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    pub net: NetworkType,

    /// Covenant balance conservation is enforced from this height on. Below it covenant
    /// scripts are accepted without balance checks.
    pub covenant_activation_height: BlockHeight,

    /// Number of blocks before coinbase outputs can be spent
    pub coinbase_maturity: u32,

    /// Upper bound of any amount, in satoshis
    pub max_money: i64,

    pub max_tx_sigchecks: usize,
}

impl Params {
    pub fn network_name(&self) -> String {
        self.net.to_string()
    }

    /// Whether covenant rules apply to a transaction included at `height`
    pub fn covenants_active(&self, height: BlockHeight) -> bool {
        height >= self.covenant_activation_height
    }
}

impl From<NetworkType> for Params {
    fn from(value: NetworkType) -> Self {
        match value {
            NetworkType::Mainnet => MAINNET_PARAMS,
            NetworkType::Testnet => TESTNET_PARAMS,
            NetworkType::Regtest => REGTEST_PARAMS,
        }
    }
}

pub const MAINNET_PARAMS: Params = Params {
    net: NetworkType::Mainnet,
    covenant_activation_height: MAINNET_COVENANT_ACTIVATION_HEIGHT,
    coinbase_maturity: COINBASE_MATURITY,
    max_money: MAX_MONEY,
    max_tx_sigchecks: MAX_TX_SIGCHECKS,
};

pub const TESTNET_PARAMS: Params = Params {
    net: NetworkType::Testnet,
    covenant_activation_height: MAINNET_COVENANT_ACTIVATION_HEIGHT,
    coinbase_maturity: COINBASE_MATURITY,
    max_money: MAX_MONEY,
    max_tx_sigchecks: MAX_TX_SIGCHECKS,
};

/// Local test network, covenant rules are active from genesis
pub const REGTEST_PARAMS: Params = Params {
    net: NetworkType::Regtest,
    covenant_activation_height: 0,
    coinbase_maturity: COINBASE_MATURITY,
    max_money: MAX_MONEY,
    max_tx_sigchecks: MAX_TX_SIGCHECKS,
};
