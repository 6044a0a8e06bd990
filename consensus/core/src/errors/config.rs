use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration: {0}")]
    Parse(String),

    #[error("Configuration: coin-cache-max-bytes must be positive")]
    ZeroCoinCacheSize,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
