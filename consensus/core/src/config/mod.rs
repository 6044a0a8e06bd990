pub mod constants;
pub mod params;

use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::errors::config::{ConfigError, ConfigResult};
use {
    constants::perf::{DEFAULT_COIN_CACHE_MAX_BYTES, DEFAULT_PARALLEL_SCRIPT_CHECK_THRESHOLD},
    params::{MAINNET_PARAMS, Params},
};

/// Various consensus configurations all bundled up under a single struct. Use `Config::new` for directly building from
/// a `Params` instance. For anything more complex it is recommended to use `ConfigBuilder`. NOTE: this struct can be
/// implicitly de-refed into `Params`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Consensus params
    pub params: Params,

    //
    // Additional configuration arguments which are not consensus sensitive
    //
    /// Memory ceiling of the tip coin cache in bytes
    pub coin_cache_max_bytes: usize,

    /// Transactions with at least this many inputs have their scripts verified in parallel
    pub parallel_script_check_threshold: usize,

    /// Relay transactions which only pass the mandatory script flags
    pub accept_non_standard: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(MAINNET_PARAMS)
    }
}

impl Config {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            coin_cache_max_bytes: DEFAULT_COIN_CACHE_MAX_BYTES,
            parallel_script_check_threshold: DEFAULT_PARALLEL_SCRIPT_CHECK_THRESHOLD,
            accept_non_standard: false,
        }
    }

    /// Parses a TOML document. Missing keys keep their mainnet defaults.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(s).map_err(|err| ConfigError::Parse(err.to_string()))?;
        if config.coin_cache_max_bytes == 0 {
            return Err(ConfigError::ZeroCoinCacheSize);
        }
        Ok(config)
    }

    pub fn to_builder(&self) -> ConfigBuilder {
        ConfigBuilder { config: self.clone() }
    }
}

impl AsRef<Params> for Config {
    fn as_ref(&self) -> &Params {
        &self.params
    }
}

impl Deref for Config {
    type Target = Params;

    fn deref(&self) -> &Self::Target {
        &self.params
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(params: Params) -> Self {
        Self { config: Config::new(params) }
    }

    pub fn edit_consensus_params<F>(mut self, edit_func: F) -> Self
    where
        F: Fn(&mut Params),
    {
        edit_func(&mut self.config.params);
        self
    }

    pub fn set_coin_cache_max_bytes(mut self, max_bytes: usize) -> Self {
        self.config.coin_cache_max_bytes = max_bytes;
        self
    }

    pub fn accept_non_standard(mut self) -> Self {
        self.config.accept_non_standard = true;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
