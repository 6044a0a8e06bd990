//! Logger and logging macros
//!
//! The macros forward to the [`log`] facade so every crate of the workspace logs through a
//! single backend, configured once per process by [`init_logger`].

mod appender;
pub mod consts;
mod logger;

use appender::AppenderSpec;
use consts::{DEFAULT_LOGGER_ENV, ERR_LOG_FILE_NAME, LOG_FILE_NAME};
use log::LevelFilter;
use log4rs::config::{Config, Root};
use logger::Filters;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum LogError {
    #[error("invalid logging filter '{0}'")]
    ParseFilterError(String),

    #[error("log appender error: {0}")]
    AppenderError(String),

    #[error("logger configuration error: {0}")]
    ConfigError(String),
}

#[macro_export]
macro_rules! trace {
    ($($t:tt)*) => (
        $crate::log::__private_log::trace!($($t)*)
    )
}

#[macro_export]
macro_rules! debug {
    ($($t:tt)*) => (
        $crate::log::__private_log::debug!($($t)*)
    )
}

#[macro_export]
macro_rules! info {
    ($($t:tt)*) => (
        $crate::log::__private_log::info!($($t)*)
    )
}

#[macro_export]
macro_rules! warn {
    ($($t:tt)*) => (
        $crate::log::__private_log::warn!($($t)*)
    )
}

#[macro_export]
macro_rules! error {
    ($($t:tt)*) => (
        $crate::log::__private_log::error!($($t)*)
    )
}

#[doc(hidden)]
pub use log as __private_log;

const CONSOLE_APPENDER: &str = "stdout";
const LOG_FILE_APPENDER: &str = "log_file";
const ERR_LOG_FILE_APPENDER: &str = "err_log_file";

fn build_config(log_dir: Option<&str>, filters: &str) -> Result<Config, LogError> {
    let filters = Filters::new().with_root_level(LevelFilter::Info).parse_env(DEFAULT_LOGGER_ENV).parse_expression(filters);

    let mut appenders = vec![AppenderSpec::console(CONSOLE_APPENDER, None)];
    if let Some(log_dir) = log_dir {
        appenders.push(AppenderSpec::roller(LOG_FILE_APPENDER, None, log_dir, LOG_FILE_NAME)?);
        appenders.push(AppenderSpec::roller(ERR_LOG_FILE_APPENDER, Some(LevelFilter::Warn), log_dir, ERR_LOG_FILE_NAME)?);
    }
    let names = appenders.iter().map(|spec| spec.name).collect::<Vec<_>>();

    Config::builder()
        .appenders(appenders.into_iter().map(|spec| spec.appender()))
        .loggers(filters.loggers(&names))
        .build(Root::builder().appenders(names.iter().map(|x| x.to_string())).build(filters.root_level()))
        .map_err(|err| LogError::ConfigError(err.to_string()))
}

/// Initializes the process-wide logger.
///
/// `filters` follows the `RUST_LOG` syntax and is applied on top of the `RUST_LOG` environment
/// variable. When `log_dir` is provided, all records are also written to a rolling log file and
/// warnings and errors to a separate error log file.
pub fn init_logger(log_dir: Option<&str>, filters: &str) -> Result<(), LogError> {
    let config = build_config(log_dir, filters)?;
    log4rs::init_config(config).map_err(|err| LogError::ConfigError(err.to_string()))?;
    Ok(())
}

/// Tries to init the global logger, but does not panic if it was already setup.
/// Should be used for tests.
pub fn try_init_logger(filters: &str) {
    if let Ok(config) = build_config(None, filters) {
        let _ = log4rs::init_config(config);
    }
}
